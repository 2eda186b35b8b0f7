//! Persisted directory entry points, one row per (company, state).

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use scout_core::{Company, ResolvedUrl, UrlSource, WorkItemKey};
use sqlx::SqlitePool;

type UrlRow = (String, String, String, String, String);

/// Insert or overwrite the entry for `entry.key`.
pub async fn upsert_url(pool: &SqlitePool, entry: &ResolvedUrl) -> Result<()> {
    sqlx::query(
        "INSERT INTO url_cache (company, state, url, source, confirmed_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(company, state) DO UPDATE SET
             url = excluded.url,
             source = excluded.source,
             confirmed_at = excluded.confirmed_at",
    )
    .bind(entry.key.company.slug())
    .bind(&entry.key.state)
    .bind(&entry.url)
    .bind(entry.source.as_str())
    .bind(entry.confirmed_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up the entry for a key.
pub async fn get_url(pool: &SqlitePool, key: &WorkItemKey) -> Result<Option<ResolvedUrl>> {
    let row = sqlx::query_as::<_, UrlRow>(
        "SELECT company, state, url, source, confirmed_at FROM url_cache
         WHERE company = ? AND state = ?",
    )
    .bind(key.company.slug())
    .bind(&key.state)
    .fetch_optional(pool)
    .await?;

    row.map(decode_row).transpose()
}

/// All cached entries, ordered by company then state.
pub async fn list_urls(pool: &SqlitePool) -> Result<Vec<ResolvedUrl>> {
    let rows = sqlx::query_as::<_, UrlRow>(
        "SELECT company, state, url, source, confirmed_at FROM url_cache
         ORDER BY company, state",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(decode_row).collect()
}

fn decode_row((company, state, url, source, confirmed_at): UrlRow) -> Result<ResolvedUrl> {
    let company: Company = company
        .parse()
        .map_err(|e| DatabaseError::Decode(format!("url_cache.company: {e}")))?;
    let source: UrlSource = source
        .parse()
        .map_err(|e| DatabaseError::Decode(format!("url_cache.source: {e}")))?;

    Ok(ResolvedUrl {
        key: WorkItemKey::new(company, state),
        url,
        confirmed_at: parse_timestamp(&confirmed_at)?,
        source,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{raw}': {e}")))
}
