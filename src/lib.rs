//! kgtx - best-effort two-phase write coordinator for dual-store knowledge
//! graph ingestion.
//!
//! Knowledge-graph writes span a Neo4j graph store and a SQLite metadata
//! store, two engines that cannot join a single native transaction. This
//! crate makes those writes appear atomic to callers: operations are staged
//! on held native transactions per store (prepare phase), then committed
//! sequentially (commit phase), with typed errors, automatic rollback on
//! prepare failure or timeout, and an explicit `partial_failure` outcome
//! when the second commit fails after the first succeeded. A background
//! reaper rolls back expired transactions and purges old terminal records.
//!
//! Store access goes through injected session factories, so the coordinator
//! runs against fakes in tests and real drivers in production.

pub mod config;
pub mod error;
pub mod metrics;
pub mod reaper;
pub mod store;
pub mod txn;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::{CoordinatorConfig, ReaperConfig, Settings};
pub use error::{CoordinatorError, CoordinatorResult};
pub use reaper::TransactionReaper;
pub use store::{
    GraphSessionFactory, GraphStoreSession, Operation, RelationalConnection,
    RelationalConnectionFactory, StoreError, StoreKind, StoreResult,
};
pub use txn::{
    CommitResult, RollbackReason, RollbackResult, TransactionCoordinator, TransactionRecord,
    TxStatus,
};

/// Initialize tracing for embedding binaries and integration tests.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kgtx=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .ok();
}
