//! Embedded schema migrations.

use crate::error::{DatabaseError, Result};
use sqlx::{Pool, Sqlite};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply every migration not yet recorded in `_sqlx_migrations`.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    tracing::debug!(migrations = MIGRATOR.iter().count(), "Schema up to date");
    Ok(())
}

/// Highest applied migration version; 0 on a fresh database.
pub async fn schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let tracked: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;
    if !tracked {
        return Ok(0);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::open_memory_pool;

    #[tokio::test]
    async fn test_schema_tables() {
        let pool = open_memory_pool().await.expect("open pool");
        run_migrations(&pool).await.expect("migrate");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' \
             ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("list tables");

        assert_eq!(
            tables,
            vec!["advisor_records", "job_results", "runs", "url_cache"]
        );
    }

    #[tokio::test]
    async fn test_version_tracks_reruns() {
        let pool = open_memory_pool().await.expect("open pool");
        assert_eq!(schema_version(&pool).await.expect("version"), 0);

        run_migrations(&pool).await.expect("migrate");
        run_migrations(&pool).await.expect("rerun is a no-op");
        assert_eq!(schema_version(&pool).await.expect("version"), 1);
    }
}
