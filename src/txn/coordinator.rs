//! Two-phase transaction coordinator
//!
//! Orchestrates `begin -> prepare(neo4j) / prepare(sqlite) -> commit_all`
//! across the two stores, with `rollback_all` reachable from every
//! non-terminal state. Neither store supports XA, so atomicity is
//! best-effort: both sides are prepared on held native transactions, then
//! committed sequentially. SQLite commits first; it is the cheaper side to
//! verify and to compensate for if the graph commit then fails. A failure
//! of the second commit is surfaced as `partial_failure` with
//! `recovery_needed` set, and is never retried here.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::store::{
    GraphSessionFactory, Operation, RelationalConnectionFactory, StoreKind,
};
use crate::txn::record::{RollbackReason, TransactionRecord, TxStatus};
use crate::txn::registry::{TransactionRegistry, TxSlot};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of `commit_all`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub status: String,
    pub neo4j_committed: bool,
    pub sqlite_committed: bool,
    pub recovery_needed: bool,
    pub errors: Vec<String>,
}

/// Outcome of `rollback_all`.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub status: String,
    pub reason: String,
    pub neo4j_rolled_back: bool,
    pub sqlite_rolled_back: bool,
}

/// Coordinates transactions spanning the graph and relational stores.
///
/// Store sessions are obtained through the injected factories; the
/// coordinator never constructs them itself.
pub struct TransactionCoordinator {
    registry: Arc<TransactionRegistry>,
    graph_factory: Arc<dyn GraphSessionFactory>,
    relational_factory: Arc<dyn RelationalConnectionFactory>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(
        graph_factory: Arc<dyn GraphSessionFactory>,
        relational_factory: Arc<dyn RelationalConnectionFactory>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(TransactionRegistry::new()),
            graph_factory,
            relational_factory,
            config,
        }
    }

    /// Generate an id for callers that do not supply their own.
    pub fn generate_tx_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a new transaction in `active` status with a deadline of
    /// now + the configured timeout.
    pub async fn begin_transaction(&self, tx_id: &str) -> CoordinatorResult<()> {
        let record = TransactionRecord::new(tx_id, self.config.timeout_seconds);
        self.registry.insert(record)?;

        crate::metrics::record_tx_begun();
        debug!(tx_id, "transaction started");
        Ok(())
    }

    /// Stage operations on a held Neo4j transaction without committing it.
    pub async fn prepare_graph(&self, tx_id: &str, ops: Vec<Operation>) -> CoordinatorResult<()> {
        let slot = self.get_slot(tx_id)?;
        let mut guard = slot.lock().await;

        self.check_deadline(&mut guard, tx_id, "prepare_graph").await?;
        match guard.record.status {
            TxStatus::Active | TxStatus::SqlitePrepared => {}
            status => {
                return Err(CoordinatorError::InvalidState {
                    tx_id: tx_id.to_string(),
                    status: status.as_str(),
                    operation: "prepare_graph",
                })
            }
        }

        let mut session = match self.graph_factory.acquire_graph_session().await {
            Ok(s) => s,
            Err(e) => {
                let cause = e.to_string();
                self.rollback_slot(&mut guard, RollbackReason::PrepareFailure)
                    .await;
                return Err(self.prepare_failure(StoreKind::Neo4j, tx_id, cause));
            }
        };

        let call_timeout = Duration::from_secs(self.config.timeout_seconds);
        let run_result = {
            let run_all = async {
                for op in &ops {
                    session.run(&op.query, &op.params).await?;
                }
                Ok::<(), crate::store::StoreError>(())
            };
            timeout(call_timeout, run_all).await
        };

        match run_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let cause = e.to_string();
                if let Err(e) = session.rollback().await {
                    warn!(tx_id, error = %e, "neo4j session rollback failed");
                }
                self.rollback_slot(&mut guard, RollbackReason::PrepareFailure)
                    .await;
                return Err(self.prepare_failure(StoreKind::Neo4j, tx_id, cause));
            }
            Err(_) => {
                if let Err(e) = session.rollback().await {
                    warn!(tx_id, error = %e, "neo4j session rollback failed");
                }
                self.rollback_slot(&mut guard, RollbackReason::Timeout).await;
                return Err(self.timeout_error(tx_id, "prepare_graph"));
            }
        }

        let next = if guard.record.status == TxStatus::Active {
            TxStatus::Neo4jPrepared
        } else {
            TxStatus::Prepared
        };
        let advanced = guard.record.transition(next);
        debug_assert!(advanced, "graph prepare refused by state machine");
        guard.record.graph_ops = ops;
        guard.graph_session = Some(session);

        info!(tx_id, status = %guard.record.status, "graph side prepared");
        Ok(())
    }

    /// Stage operations on a held SQLite transaction without committing it.
    pub async fn prepare_relational(
        &self,
        tx_id: &str,
        ops: Vec<Operation>,
    ) -> CoordinatorResult<()> {
        let slot = self.get_slot(tx_id)?;
        let mut guard = slot.lock().await;

        self.check_deadline(&mut guard, tx_id, "prepare_relational")
            .await?;
        match guard.record.status {
            TxStatus::Active | TxStatus::Neo4jPrepared => {}
            status => {
                return Err(CoordinatorError::InvalidState {
                    tx_id: tx_id.to_string(),
                    status: status.as_str(),
                    operation: "prepare_relational",
                })
            }
        }

        let mut conn = match self.relational_factory.acquire_relational_connection().await {
            Ok(c) => c,
            Err(e) => {
                let cause = e.to_string();
                self.rollback_slot(&mut guard, RollbackReason::PrepareFailure)
                    .await;
                return Err(self.prepare_failure(StoreKind::Sqlite, tx_id, cause));
            }
        };

        let call_timeout = Duration::from_secs(self.config.timeout_seconds);
        let execute_result = {
            let execute_all = async {
                for op in &ops {
                    conn.execute(&op.query, &op.params).await?;
                }
                Ok::<(), crate::store::StoreError>(())
            };
            timeout(call_timeout, execute_all).await
        };

        match execute_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let cause = e.to_string();
                if let Err(e) = conn.rollback().await {
                    warn!(tx_id, error = %e, "sqlite connection rollback failed");
                }
                self.rollback_slot(&mut guard, RollbackReason::PrepareFailure)
                    .await;
                return Err(self.prepare_failure(StoreKind::Sqlite, tx_id, cause));
            }
            Err(_) => {
                if let Err(e) = conn.rollback().await {
                    warn!(tx_id, error = %e, "sqlite connection rollback failed");
                }
                self.rollback_slot(&mut guard, RollbackReason::Timeout).await;
                return Err(self.timeout_error(tx_id, "prepare_relational"));
            }
        }

        let next = if guard.record.status == TxStatus::Active {
            TxStatus::SqlitePrepared
        } else {
            TxStatus::Prepared
        };
        let advanced = guard.record.transition(next);
        debug_assert!(advanced, "relational prepare refused by state machine");
        guard.record.relational_ops = ops;
        guard.relational_conn = Some(conn);

        info!(tx_id, status = %guard.record.status, "relational side prepared");
        Ok(())
    }

    /// Commit both held native transactions, SQLite first.
    ///
    /// Requires both sides prepared. The commit order is a fixed policy,
    /// not configurable. If the Neo4j commit fails after SQLite committed,
    /// the transaction lands in `partial_failure` and the result carries
    /// `recovery_needed: true`; reconciliation is external.
    pub async fn commit_all(&self, tx_id: &str) -> CoordinatorResult<CommitResult> {
        let slot = self.get_slot(tx_id)?;
        let mut guard = slot.lock().await;

        self.check_deadline(&mut guard, tx_id, "commit_all").await?;
        if guard.record.status != TxStatus::Prepared {
            return Err(CoordinatorError::InvalidState {
                tx_id: tx_id.to_string(),
                status: guard.record.status.as_str(),
                operation: "commit_all",
            });
        }

        let started = Instant::now();
        let call_timeout = Duration::from_secs(self.config.timeout_seconds);

        // Both handles must exist in `prepared`.
        let (mut graph, mut relational) =
            match (guard.graph_session.take(), guard.relational_conn.take()) {
                (Some(g), Some(r)) => (g, r),
                _ => {
                    return Err(CoordinatorError::InvalidState {
                        tx_id: tx_id.to_string(),
                        status: guard.record.status.as_str(),
                        operation: "commit_all",
                    })
                }
            };

        // Phase one: SQLite. A failure here leaves nothing durable, so the
        // graph side is rolled back and the transaction fails cleanly.
        let sqlite_result = match timeout(call_timeout, relational.commit()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("sqlite commit timed out".to_string()),
        };

        if let Err(cause) = sqlite_result {
            // Best effort on both handles: the failed connection's native
            // transaction state is indeterminate, and the graph side still
            // holds an open transaction.
            if let Err(e) = relational.rollback().await {
                warn!(tx_id, error = %e, "sqlite rollback after failed commit also failed");
            }
            if let Err(e) = graph.rollback().await {
                warn!(tx_id, error = %e, "neo4j rollback after sqlite commit failure also failed");
            }
            let message = format!("sqlite commit failed: {cause}");
            warn!(tx_id, %message, "commit aborted in first phase");
            guard.record.errors.push(message.clone());
            let advanced = guard.record.transition(TxStatus::Failed);
            debug_assert!(advanced, "failed transition refused by state machine");
            crate::metrics::record_tx_failed();

            return Ok(CommitResult {
                status: TxStatus::Failed.as_str().to_string(),
                neo4j_committed: false,
                sqlite_committed: false,
                recovery_needed: false,
                errors: vec![message],
            });
        }

        // Phase two: Neo4j. SQLite is already durable; a failure here is
        // the documented partial-failure boundary. No retry.
        let graph_result = match timeout(call_timeout, graph.commit()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("neo4j commit timed out".to_string()),
        };

        if let Err(cause) = graph_result {
            // The graph session still holds an open native transaction;
            // release it before the record goes terminal.
            if let Err(e) = graph.rollback().await {
                warn!(tx_id, error = %e, "neo4j rollback after failed commit also failed");
            }
            let err = CoordinatorError::PartialCommitFailure {
                tx_id: tx_id.to_string(),
                cause,
            };
            let message = err.to_string();
            warn!(tx_id, %message, "partial commit failure, reconciliation needed");
            guard.record.errors.push(message.clone());
            let advanced = guard.record.transition(TxStatus::PartialFailure);
            debug_assert!(advanced, "partial_failure transition refused by state machine");
            crate::metrics::record_partial_failure();

            return Ok(CommitResult {
                status: TxStatus::PartialFailure.as_str().to_string(),
                neo4j_committed: false,
                sqlite_committed: true,
                recovery_needed: true,
                errors: vec![message],
            });
        }

        let advanced = guard.record.transition(TxStatus::Committed);
        debug_assert!(advanced, "commit transition refused by state machine");
        crate::metrics::record_tx_committed(started.elapsed().as_secs_f64());
        info!(tx_id, "transaction committed on both stores");

        Ok(CommitResult {
            status: TxStatus::Committed.as_str().to_string(),
            neo4j_committed: true,
            sqlite_committed: true,
            recovery_needed: false,
            errors: Vec::new(),
        })
    }

    /// Roll back an explicit caller request.
    pub async fn rollback_all(&self, tx_id: &str) -> CoordinatorResult<RollbackResult> {
        self.rollback_with_reason(tx_id, RollbackReason::Requested)
            .await
    }

    /// Roll back whichever native handles are open and mark the record
    /// `rolled_back`. Idempotent: repeating it on an already rolled back
    /// transaction is a no-op success.
    pub(crate) async fn rollback_with_reason(
        &self,
        tx_id: &str,
        reason: RollbackReason,
    ) -> CoordinatorResult<RollbackResult> {
        let slot = self.get_slot(tx_id)?;
        let mut guard = slot.lock().await;

        match guard.record.status {
            TxStatus::RolledBack => {
                let reason = guard
                    .record
                    .rollback_reason
                    .unwrap_or(RollbackReason::Requested);
                return Ok(RollbackResult {
                    status: TxStatus::RolledBack.as_str().to_string(),
                    reason: reason.as_str().to_string(),
                    neo4j_rolled_back: false,
                    sqlite_rolled_back: false,
                });
            }
            status if status.is_terminal() => {
                return Err(CoordinatorError::InvalidState {
                    tx_id: tx_id.to_string(),
                    status: status.as_str(),
                    operation: "rollback_all",
                })
            }
            _ => {}
        }

        let (neo4j_rolled_back, sqlite_rolled_back) =
            self.rollback_slot(&mut guard, reason).await;
        info!(tx_id, reason = %reason, "transaction rolled back");

        Ok(RollbackResult {
            status: TxStatus::RolledBack.as_str().to_string(),
            reason: reason.as_str().to_string(),
            neo4j_rolled_back,
            sqlite_rolled_back,
        })
    }

    /// Read-only snapshot of a transaction record, `None` once the reaper
    /// has purged it.
    pub async fn get_transaction_state(&self, tx_id: &str) -> Option<TransactionRecord> {
        self.registry.snapshot(tx_id).await
    }

    /// Roll back every non-terminal transaction past its deadline.
    /// Invoked periodically by the reaper.
    pub async fn reap_expired(&self) -> usize {
        let expired = self.registry.scan_expired(Utc::now()).await;
        let mut reaped = 0;

        for tx_id in expired {
            match self.rollback_with_reason(&tx_id, RollbackReason::Timeout).await {
                Ok(_) => {
                    warn!(tx_id = %tx_id, "transaction deadline elapsed, rolled back");
                    reaped += 1;
                }
                // Lost the race with a concurrent terminal transition.
                Err(e) => debug!(tx_id = %tx_id, error = %e, "skipping expired transaction"),
            }
        }

        if reaped > 0 {
            crate::metrics::record_tx_reaped(reaped);
        }
        reaped
    }

    /// Delete terminal records older than the retention window. Records
    /// still in flight are never removed, whatever their age.
    pub async fn cleanup_old_transactions(&self) -> usize {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.cleanup_after_seconds as i64);
        let old = self.registry.scan_terminal_before(cutoff).await;
        let mut purged = 0;

        for tx_id in &old {
            if self.registry.remove(tx_id) {
                purged += 1;
            }
        }

        if purged > 0 {
            crate::metrics::record_tx_purged(purged);
            debug!(purged, "purged terminal transaction records");
        }
        purged
    }

    /// Number of tracked transaction records, terminal included.
    pub fn tracked_transactions(&self) -> usize {
        self.registry.len()
    }

    fn get_slot(
        &self,
        tx_id: &str,
    ) -> CoordinatorResult<Arc<tokio::sync::Mutex<TxSlot>>> {
        self.registry
            .get(tx_id)
            .ok_or_else(|| CoordinatorError::TransactionNotFound(tx_id.to_string()))
    }

    /// Treat an already-elapsed deadline as a timeout: roll back and error.
    async fn check_deadline(
        &self,
        guard: &mut TxSlot,
        tx_id: &str,
        operation: &'static str,
    ) -> CoordinatorResult<()> {
        if guard.record.is_expired(Utc::now()) {
            self.rollback_slot(guard, RollbackReason::Timeout).await;
            return Err(self.timeout_error(tx_id, operation));
        }
        Ok(())
    }

    /// Shared rollback path: release whichever native handles are open
    /// (rolling back a side that never prepared is a no-op) and mark the
    /// record rolled back.
    async fn rollback_slot(&self, guard: &mut TxSlot, reason: RollbackReason) -> (bool, bool) {
        let mut neo4j_rolled_back = false;
        let mut sqlite_rolled_back = false;

        if let Some(mut session) = guard.graph_session.take() {
            match session.rollback().await {
                Ok(()) => neo4j_rolled_back = true,
                Err(e) => warn!(tx_id = %guard.record.id, error = %e, "neo4j rollback failed"),
            }
        }
        if let Some(mut conn) = guard.relational_conn.take() {
            match conn.rollback().await {
                Ok(()) => sqlite_rolled_back = true,
                Err(e) => warn!(tx_id = %guard.record.id, error = %e, "sqlite rollback failed"),
            }
        }

        let advanced = guard.record.transition(TxStatus::RolledBack);
        debug_assert!(advanced, "rollback transition refused by state machine");
        guard.record.rollback_reason = Some(reason);
        crate::metrics::record_tx_rolled_back(reason.as_str());

        (neo4j_rolled_back, sqlite_rolled_back)
    }

    fn prepare_failure(&self, store: StoreKind, tx_id: &str, cause: String) -> CoordinatorError {
        crate::metrics::record_prepare_failure(&store.to_string());
        warn!(tx_id, %store, %cause, "prepare failed, transaction rolled back");
        CoordinatorError::PrepareFailure {
            store,
            tx_id: tx_id.to_string(),
            cause,
        }
    }

    fn timeout_error(&self, tx_id: &str, operation: &str) -> CoordinatorError {
        warn!(tx_id, operation, "operation timed out, transaction rolled back");
        CoordinatorError::Timeout {
            tx_id: tx_id.to_string(),
            operation: operation.to_string(),
        }
    }
}
