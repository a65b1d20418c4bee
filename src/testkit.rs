//! In-memory fake stores for coordinator tests
//!
//! Each fake backend records what has been durably committed; sessions stage
//! operations until `commit` moves them into the backend, matching the
//! hold-open-then-commit contract of the real drivers. Failure injection
//! covers the three interesting paths: an operation that errors, a commit
//! that errors, and an operation slow enough to trip the call timeout.

use crate::config::CoordinatorConfig;
use crate::store::{
    GraphSessionFactory, GraphStoreSession, Operation, RelationalConnection,
    RelationalConnectionFactory, StoreError, StoreResult,
};
use crate::txn::TransactionCoordinator;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared durable state behind one fake store.
#[derive(Default)]
pub struct FakeBackend {
    committed: Mutex<Vec<Operation>>,
    fail_marker: Mutex<Option<String>>,
    op_delay: Mutex<Option<Duration>>,
    fail_commit: AtomicBool,
    rollbacks: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Operations made durable by committed sessions.
    pub fn committed_ops(&self) -> Vec<Operation> {
        self.committed.lock().unwrap().clone()
    }

    /// Any operation whose query contains `marker` errors.
    pub fn fail_queries_containing(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    /// Every operation sleeps for `delay` before completing.
    pub fn delay_operations(&self, delay: Duration) {
        *self.op_delay.lock().unwrap() = Some(delay);
    }

    /// The next commit on any session of this backend errors.
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    /// How many sessions of this backend have been rolled back.
    pub fn rollback_calls(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    async fn apply(&self, query: &str, params: &HashMap<String, serde_json::Value>, staged: &mut Vec<Operation>) -> StoreResult<()> {
        let delay = *self.op_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let marker = self.fail_marker.lock().unwrap().clone();
        if let Some(marker) = marker {
            if query.contains(&marker) {
                return Err(StoreError::new(format!("syntax error near '{marker}'")));
            }
        }

        staged.push(Operation::new(query, params.clone()));
        Ok(())
    }

    fn commit(&self, staged: &mut Vec<Operation>) -> StoreResult<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::new("connection lost during commit"));
        }
        self.committed.lock().unwrap().append(staged);
        Ok(())
    }

    fn note_rollback(&self, staged: &mut Vec<Operation>) {
        staged.clear();
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeGraphSession {
    backend: Arc<FakeBackend>,
    staged: Vec<Operation>,
}

#[async_trait]
impl GraphStoreSession for FakeGraphSession {
    async fn run(
        &mut self,
        query: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StoreResult<()> {
        self.backend.apply(query, params, &mut self.staged).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.backend.commit(&mut self.staged)
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.backend.note_rollback(&mut self.staged);
        Ok(())
    }
}

pub struct FakeRelationalConnection {
    backend: Arc<FakeBackend>,
    staged: Vec<Operation>,
}

#[async_trait]
impl RelationalConnection for FakeRelationalConnection {
    async fn execute(
        &mut self,
        query: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StoreResult<()> {
        self.backend.apply(query, params, &mut self.staged).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.backend.commit(&mut self.staged)
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.backend.note_rollback(&mut self.staged);
        Ok(())
    }
}

pub struct FakeGraphFactory {
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl GraphSessionFactory for FakeGraphFactory {
    async fn acquire_graph_session(&self) -> StoreResult<Box<dyn GraphStoreSession>> {
        Ok(Box::new(FakeGraphSession {
            backend: self.backend.clone(),
            staged: Vec::new(),
        }))
    }
}

pub struct FakeRelationalFactory {
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl RelationalConnectionFactory for FakeRelationalFactory {
    async fn acquire_relational_connection(&self) -> StoreResult<Box<dyn RelationalConnection>> {
        Ok(Box::new(FakeRelationalConnection {
            backend: self.backend.clone(),
            staged: Vec::new(),
        }))
    }
}

/// Coordinator wired to fresh fake backends.
pub fn coordinator_with_fakes(
    timeout_seconds: u64,
) -> (TransactionCoordinator, Arc<FakeBackend>, Arc<FakeBackend>) {
    coordinator_with_config(CoordinatorConfig {
        timeout_seconds,
        cleanup_after_seconds: 3600,
    })
}

pub fn coordinator_with_config(
    config: CoordinatorConfig,
) -> (TransactionCoordinator, Arc<FakeBackend>, Arc<FakeBackend>) {
    let graph = FakeBackend::new();
    let relational = FakeBackend::new();

    let coordinator = TransactionCoordinator::new(
        Arc::new(FakeGraphFactory {
            backend: graph.clone(),
        }),
        Arc::new(FakeRelationalFactory {
            backend: relational.clone(),
        }),
        config,
    );

    (coordinator, graph, relational)
}

/// Operation with no parameters, enough for most tests.
pub fn op(query: &str) -> Operation {
    Operation::new(query, HashMap::new())
}
