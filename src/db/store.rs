//! Store seams consumed by the turn pipeline, plus the DuckDB-backed implementation.

use async_trait::async_trait;
use duckdb::Connection;
use thiserror::Error;

use crate::db::{models::{NewTurn, Turn}, service::DbService, DbPool};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database Error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable `session_id -> topic` mapping.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn get_topic(&self, session_id: &str) -> Result<Option<String>, StoreError>;

    /// Last write wins.
    async fn set_topic(&self, session_id: &str, topic: &str) -> Result<(), StoreError>;
}

/// Append-only turn log.
#[async_trait]
pub trait TurnStore: Send + Sync {
    async fn append_turn(&self, turn: &NewTurn) -> Result<Turn, StoreError>;

    /// Up to `limit` of the session's newest turns, oldest first.
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError>;

    async fn session_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError>;

    /// Every turn, newest first.
    async fn list_turns(&self) -> Result<Vec<Turn>, StoreError>;
}

#[derive(Clone)]
pub struct DuckDbStore {
    pool: DbPool,
}

impl DuckDbStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // The guard never outlives this call, so it is never held across an await.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> duckdb::Result<T>) -> Result<T, StoreError> {
        let conn = self.pool.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&conn)?)
    }
}

#[async_trait]
impl TopicStore for DuckDbStore {
    async fn get_topic(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| DbService::get_topic(conn, session_id))
    }

    async fn set_topic(&self, session_id: &str, topic: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| DbService::upsert_topic(conn, session_id, topic))
    }
}

#[async_trait]
impl TurnStore for DuckDbStore {
    async fn append_turn(&self, turn: &NewTurn) -> Result<Turn, StoreError> {
        let id = self.with_conn(|conn| DbService::insert_turn(conn, turn))?;
        Ok(turn.clone().into_turn(id))
    }

    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        self.with_conn(|conn| DbService::recent_turns(conn, session_id, limit))
    }

    async fn session_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        self.with_conn(|conn| DbService::session_turns(conn, session_id, limit))
    }

    async fn list_turns(&self) -> Result<Vec<Turn>, StoreError> {
        self.with_conn(DbService::list_turns)
    }
}
