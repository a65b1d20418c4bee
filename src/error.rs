//! Error types for the transaction coordinator

use crate::store::{StoreError, StoreKind};
use thiserror::Error;

/// Main error type for coordinator operations
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("transaction {0} already exists")]
    DuplicateTransaction(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("invalid state for {operation}: transaction {tx_id} is {status}")]
    InvalidState {
        tx_id: String,
        status: &'static str,
        operation: &'static str,
    },

    #[error("prepare failed on {store} for transaction {tx_id}: {cause}")]
    PrepareFailure {
        store: StoreKind,
        tx_id: String,
        cause: String,
    },

    #[error("timeout during {operation} for transaction {tx_id}")]
    Timeout { tx_id: String, operation: String },

    #[error("partial commit failure for transaction {tx_id}: sqlite committed but neo4j did not ({cause})")]
    PartialCommitFailure { tx_id: String, cause: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    /// Whether this error must be accompanied by an automatic rollback
    /// of the owning transaction.
    pub fn triggers_rollback(&self) -> bool {
        matches!(
            self,
            CoordinatorError::PrepareFailure { .. } | CoordinatorError::Timeout { .. }
        )
    }
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
