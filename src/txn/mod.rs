//! Transaction lifecycle: record, registry, and coordinator
//!
//! The coordinator:
//! 1. Tracks each transaction in the registry under a per-record lock
//! 2. Stages operations on held native transactions during prepare
//! 3. Commits SQLite then Neo4j, surfacing partial failures explicitly
//! 4. Owns releasing native handles on every terminal transition

pub mod coordinator;
pub mod record;
pub mod registry;

pub use coordinator::{CommitResult, RollbackResult, TransactionCoordinator};
pub use record::{RollbackReason, TransactionRecord, TxStatus};
pub use registry::{TransactionRegistry, TxSlot};
