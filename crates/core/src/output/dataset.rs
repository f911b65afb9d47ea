use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// One tabular result row per attempted listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub run_id: String,
    pub listing_id: String,
    pub title: String,
    pub action: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only tabular result store.
#[async_trait]
pub trait DatasetSink: Send + Sync {
    async fn push(&self, rows: &[DatasetRow]) -> Result<(), StoreError>;
}

/// SQLite-backed dataset
pub struct SqliteDataset {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS listing_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    listing_id TEXT NOT NULL,
    title TEXT NOT NULL,
    action TEXT NOT NULL,
    outcome TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listing_results_run_id ON listing_results(run_id);
CREATE INDEX IF NOT EXISTS idx_listing_results_listing_id ON listing_results(listing_id);
"#;

impl SqliteDataset {
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory dataset (useful for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Rows of one run, in insertion order.
    pub fn rows_for_run(&self, run_id: &str) -> Result<Vec<DatasetRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT run_id, listing_id, title, action, outcome, timestamp
                 FROM listing_results WHERE run_id = ? ORDER BY id ASC",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            let (run_id, listing_id, title, action, outcome, timestamp) =
                row.map_err(|e| StoreError::Database(e.to_string()))?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| StoreError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            result.push(DatasetRow {
                run_id,
                listing_id,
                title,
                action,
                outcome,
                timestamp,
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl DatasetSink for SqliteDataset {
    async fn push(&self, rows: &[DatasetRow]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for row in rows {
            tx.execute(
                "INSERT INTO listing_results (run_id, listing_id, title, action, outcome, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    row.run_id,
                    row.listing_id,
                    row.title,
                    row.action,
                    row.outcome,
                    row.timestamp.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))
    }
}
