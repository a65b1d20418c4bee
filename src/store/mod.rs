//! Store adapter contracts
//!
//! The coordinator writes to two independently-committing stores: a Neo4j
//! graph store and a SQLite metadata store. It never talks to either driver
//! directly; it depends on these thin session/connection capabilities, which
//! the embedding application implements and injects via the factory traits.
//! Both session types must be able to hold an open, uncommitted native
//! transaction across multiple operation calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A single staged operation: a parameterized query or statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub query: String,
    pub params: HashMap<String, serde_json::Value>,
}

impl Operation {
    pub fn new(query: impl Into<String>, params: HashMap<String, serde_json::Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}

/// Which of the two stores an error or flag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Neo4j,
    Sqlite,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Neo4j => write!(f, "neo4j"),
            StoreKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Error surfaced by a store adapter.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for adapter operations
pub type StoreResult<T> = Result<T, StoreError>;

/// An open Neo4j session holding one uncommitted native transaction.
#[async_trait]
pub trait GraphStoreSession: Send + Sync {
    /// Run a Cypher statement inside the held transaction.
    async fn run(
        &mut self,
        query: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StoreResult<()>;

    /// Make the held transaction durable.
    async fn commit(&mut self) -> StoreResult<()>;

    /// Discard the held transaction.
    async fn rollback(&mut self) -> StoreResult<()>;
}

/// An open SQLite connection holding one uncommitted native transaction.
#[async_trait]
pub trait RelationalConnection: Send + Sync {
    /// Execute a SQL statement inside the held transaction.
    async fn execute(
        &mut self,
        query: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

/// Factory for graph sessions, injected into the coordinator.
#[async_trait]
pub trait GraphSessionFactory: Send + Sync {
    async fn acquire_graph_session(&self) -> StoreResult<Box<dyn GraphStoreSession>>;
}

/// Factory for relational connections, injected into the coordinator.
#[async_trait]
pub trait RelationalConnectionFactory: Send + Sync {
    async fn acquire_relational_connection(&self) -> StoreResult<Box<dyn RelationalConnection>>;
}
