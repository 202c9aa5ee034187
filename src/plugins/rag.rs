//! Local RAG observation store.
//!
//! Observations are rows stamped with the time they were recorded. A revert
//! purges everything recorded strictly after the target checkpoint so the
//! knowledge store never describes code that no longer exists.

use crate::core::db::db_connect;
use crate::core::error::FailsafeError;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::revert::RagPurger;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const OBSERVATIONS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS observations (
    id TEXT PRIMARY KEY,
    recorded_at TEXT NOT NULL,
    content TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_observations_recorded_at ON observations(recorded_at);";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub recorded_at: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ObservationStore {
    db_path: PathBuf,
}

impl ObservationStore {
    pub fn open(db_path: &Path) -> Result<Self, FailsafeError> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.with_conn(|conn| {
            conn.execute_batch(OBSERVATIONS_SCHEMA)?;
            Ok(())
        })?;
        Ok(store)
    }

    pub fn from_store(store: &Store) -> Result<Self, FailsafeError> {
        Self::open(&store.rag_db_path())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, FailsafeError>,
    ) -> Result<T, FailsafeError> {
        let conn = db_connect(&self.db_path)?;
        f(&conn)
    }

    pub fn record(&self, content: &str) -> Result<Observation, FailsafeError> {
        self.record_at(&time::now(), content)
    }

    pub fn record_at(
        &self,
        recorded_at: &DateTime<Utc>,
        content: &str,
    ) -> Result<Observation, FailsafeError> {
        let observation = Observation {
            id: time::new_event_id(),
            recorded_at: time::to_rfc3339(recorded_at),
            content: content.to_string(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO observations(id, recorded_at, content) VALUES(?1, ?2, ?3)",
                params![observation.id, observation.recorded_at, observation.content],
            )?;
            Ok(())
        })?;
        Ok(observation)
    }

    pub fn count(&self) -> Result<usize, FailsafeError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    /// Delete observations recorded strictly after `timestamp` (RFC 3339).
    pub fn purge_after(&self, timestamp: &str) -> Result<usize, FailsafeError> {
        // Stored stamps share one fixed-width UTC format, so text order is time order.
        let cutoff = time::parse_rfc3339(timestamp)
            .map(|ts| time::to_rfc3339(&ts))
            .ok_or_else(|| {
                FailsafeError::ValidationError(format!("invalid purge timestamp: {}", timestamp))
            })?;

        let purged = self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM observations WHERE recorded_at > ?1",
                params![cutoff],
            )?;
            Ok(n)
        })?;
        info!(purged, cutoff = %cutoff, "purged RAG observations");
        Ok(purged)
    }
}

impl RagPurger for ObservationStore {
    fn purge_rag_after(&self, timestamp: &str) -> Result<usize, FailsafeError> {
        self.purge_after(timestamp)
    }
}
