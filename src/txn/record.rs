//! Transaction record and status state machine

use crate::store::Operation;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Status of a coordinated transaction.
///
/// Strictly forward-progressing; the terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Active,
    Neo4jPrepared,
    SqlitePrepared,
    Prepared,
    Committed,
    RolledBack,
    Failed,
    PartialFailure,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Active => "active",
            TxStatus::Neo4jPrepared => "neo4j_prepared",
            TxStatus::SqlitePrepared => "sqlite_prepared",
            TxStatus::Prepared => "prepared",
            TxStatus::Committed => "committed",
            TxStatus::RolledBack => "rolled_back",
            TxStatus::Failed => "failed",
            TxStatus::PartialFailure => "partial_failure",
        }
    }

    /// No transitions leave a terminal status. `PartialFailure` counts:
    /// it can only be resolved by external reconciliation, not by the
    /// coordinator.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Committed | TxStatus::RolledBack | TxStatus::Failed | TxStatus::PartialFailure
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transaction was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    Requested,
    PrepareFailure,
    Timeout,
}

impl RollbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackReason::Requested => "requested",
            RollbackReason::PrepareFailure => "prepare_failure",
            RollbackReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State tracked for one coordinated transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: String,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Stamped when a terminal status is reached; drives retention cleanup.
    pub completed_at: Option<DateTime<Utc>>,
    pub graph_ops: Vec<Operation>,
    pub relational_ops: Vec<Operation>,
    pub errors: Vec<String>,
    pub rollback_reason: Option<RollbackReason>,
}

impl TransactionRecord {
    pub fn new(id: impl Into<String>, timeout_seconds: u64) -> Self {
        let created_at = Utc::now();
        Self {
            id: id.into(),
            status: TxStatus::Active,
            created_at,
            deadline: created_at + Duration::seconds(timeout_seconds as i64),
            completed_at: None,
            graph_ops: Vec::new(),
            relational_ops: Vec::new(),
            errors: Vec::new(),
            rollback_reason: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.deadline
    }

    /// Attempt a status transition, returning false if the edge is not in
    /// the state machine. Status never regresses.
    pub fn transition(&mut self, next: TxStatus) -> bool {
        let allowed = match (self.status, next) {
            (TxStatus::Active, TxStatus::Neo4jPrepared)
            | (TxStatus::Active, TxStatus::SqlitePrepared)
            | (TxStatus::Neo4jPrepared, TxStatus::Prepared)
            | (TxStatus::SqlitePrepared, TxStatus::Prepared)
            | (TxStatus::Prepared, TxStatus::Committed)
            | (TxStatus::Prepared, TxStatus::Failed)
            | (TxStatus::Prepared, TxStatus::PartialFailure) => true,
            (from, TxStatus::RolledBack) => !from.is_terminal(),
            _ => false,
        };

        if allowed {
            self.status = next;
            if next.is_terminal() {
                self.completed_at = Some(Utc::now());
                // Staged ops are kept on partial failure: they are the input
                // for external reconciliation.
                if next != TxStatus::PartialFailure {
                    self.graph_ops.clear();
                    self.relational_ops.clear();
                }
            }
        }

        allowed
    }
}
