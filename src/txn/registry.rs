//! In-memory transaction registry
//!
//! A concurrency-safe map from transaction id to its slot. Each slot bundles
//! the record with the per-transaction native handles, guarded by one async
//! mutex, so operations on distinct transactions never contend and all
//! mutation of a single transaction is serialized. No cross-record
//! invariants are enforced here; ordering belongs to the coordinator.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::store::{GraphStoreSession, RelationalConnection};
use crate::txn::record::TransactionRecord;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-transaction state: the record plus whichever native handles are open.
pub struct TxSlot {
    pub record: TransactionRecord,
    pub graph_session: Option<Box<dyn GraphStoreSession>>,
    pub relational_conn: Option<Box<dyn RelationalConnection>>,
}

impl TxSlot {
    fn new(record: TransactionRecord) -> Self {
        Self {
            record,
            graph_session: None,
            relational_conn: None,
        }
    }
}

/// Registry of all live and recently-terminal transactions.
pub struct TransactionRegistry {
    slots: DashMap<String, Arc<Mutex<TxSlot>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Register a new transaction record. Fails if the id is taken.
    pub fn insert(&self, record: TransactionRecord) -> CoordinatorResult<()> {
        let id = record.id.clone();
        // Entry API keeps check-and-insert atomic under the shard lock.
        match self.slots.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CoordinatorError::DuplicateTransaction(id))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Arc::new(Mutex::new(TxSlot::new(record))));
                Ok(())
            }
        }
    }

    pub fn get(&self, tx_id: &str) -> Option<Arc<Mutex<TxSlot>>> {
        self.slots.get(tx_id).map(|e| e.value().clone())
    }

    pub fn remove(&self, tx_id: &str) -> bool {
        self.slots.remove(tx_id).is_some()
    }

    /// Read-only clone of a record.
    pub async fn snapshot(&self, tx_id: &str) -> Option<TransactionRecord> {
        let slot = self.get(tx_id)?;
        let guard = slot.lock().await;
        Some(guard.record.clone())
    }

    /// Ids of non-terminal transactions past their deadline.
    pub async fn scan_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired = Vec::new();
        for (id, slot) in self.entries() {
            let guard = slot.lock().await;
            if guard.record.is_expired(now) {
                expired.push(id);
            }
        }
        expired
    }

    /// Ids of terminal transactions completed before the cutoff.
    pub async fn scan_terminal_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut old = Vec::new();
        for (id, slot) in self.entries() {
            let guard = slot.lock().await;
            if guard.record.status.is_terminal() {
                if let Some(completed_at) = guard.record.completed_at {
                    if completed_at < cutoff {
                        old.push(id);
                    }
                }
            }
        }
        old
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // Collect the entries up front so no shard lock is held while awaiting
    // a slot mutex.
    fn entries(&self) -> Vec<(String, Arc<Mutex<TxSlot>>)> {
        self.slots
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
