//! Scout Persistence Layer
//!
//! `SQLite` storage for the directory URL cache and finalized job results,
//! plus CSV/JSON export of a run's records.
//!
//! # Architecture
//!
//! - **URL cache**: one confirmed entry point per (company, state), survives restarts
//! - **Runs**: every scraping run gets an id; each finalized work item is stored
//!   with its records in a single transaction, so partial results are never half-written
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Export**: deduplicated CSV and JSON files written at the end of a run
//!
//! # Example
//!
//! ```ignore
//! use scout_db::{Database, RunRecorder};
//!
//! let db = std::sync::Arc::new(Database::new("scout.db").await?);
//! let recorder = RunRecorder::start(db.clone(), "full").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod export;
pub mod job_results;
pub mod migrations;
pub mod store;
pub mod url_cache;

pub use error::{DatabaseError, Result};
pub use export::{dedup_records, export_run, ExportSummary};
pub use job_results::JobSummary;
pub use store::{MemoryStore, ResultSink, RunRecorder, UrlCacheStore};

use std::path::Path;

/// High-level database handle with migrations applied on open.
#[derive(Debug, Clone)]
pub struct Database {
    pool: sqlx::Pool<sqlx::Sqlite>,
}

impl Database {
    /// Open (or create) the database file at `path` and bring its schema up to date.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::open_pool(path.as_ref()).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create a migrated in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = connection::open_memory_pool().await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Apply pending migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Highest applied migration version.
    pub async fn schema_version(&self) -> Result<i64> {
        migrations::schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        &self.pool
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_database_creates_parent_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("scout.db");

        let db = Database::new(&path).await.expect("open database");
        assert!(path.exists());
        assert_eq!(db.schema_version().await.expect("version"), 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("scout.db");

        let db = Database::new(&path).await.expect("open database");
        let run = job_results::start_run(db.pool(), "test").await.expect("run");
        db.close().await;

        let db = Database::new(&path).await.expect("reopen database");
        job_results::finish_run(db.pool(), &run)
            .await
            .expect("run survives reopen");
        db.close().await;
    }
}
