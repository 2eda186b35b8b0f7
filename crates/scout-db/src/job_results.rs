//! Runs and their finalized job results.

use crate::error::{DatabaseError, Result};
use crate::url_cache::parse_timestamp;
use chrono::{DateTime, Utc};
use scout_core::{
    AdvisorRecord, Company, JobResult, JobStats, TerminationReason, WorkItemKey,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Stored outcome of one work item, without its records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job identifier
    pub id: String,
    /// Work item identity
    pub key: WorkItemKey,
    /// Why the loop stopped
    pub termination: TerminationReason,
    /// Entry URL used last
    pub entry_url: Option<String>,
    /// Number of stored records
    pub record_count: usize,
    /// Loop diagnostics
    pub stats: JobStats,
    /// When the result was finalized
    pub finished_at: DateTime<Utc>,
}

/// Register a new run and return its identifier.
pub async fn start_run(pool: &SqlitePool, mode: &str) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO runs (id, mode, started_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(mode)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(id)
}

/// Mark a run as finished.
pub async fn finish_run(pool: &SqlitePool, run_id: &str) -> Result<()> {
    let result = sqlx::query("UPDATE runs SET finished_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(run_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!(
            "Run '{run_id}' not found"
        )));
    }
    Ok(())
}

/// Store a job result and its records atomically; returns the job identifier.
pub async fn insert_job_result(
    pool: &SqlitePool,
    run_id: &str,
    result: &JobResult,
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO job_results (
             id, run_id, company, state, termination, entry_url, record_count,
             pages_visited, fetch_attempts, blocks_encountered, rediscoveries,
             total_waited_secs, started_at, finished_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(run_id)
    .bind(result.key.company.slug())
    .bind(&result.key.state)
    .bind(result.termination.as_str())
    .bind(result.entry_url.as_deref())
    .bind(i64::try_from(result.records.len()).unwrap_or(i64::MAX))
    .bind(i64::from(result.stats.pages_visited))
    .bind(i64::from(result.stats.fetch_attempts))
    .bind(i64::from(result.stats.blocks_encountered))
    .bind(i64::from(result.stats.rediscoveries))
    .bind(i64::try_from(result.stats.total_waited_secs).unwrap_or(i64::MAX))
    .bind(result.started_at.to_rfc3339())
    .bind(result.finished_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for (seq, record) in result.records.iter().enumerate() {
        sqlx::query(
            "INSERT INTO advisor_records (
                 job_id, seq, name, phone, street, city, state, email, company, source_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(i64::try_from(seq).unwrap_or(i64::MAX))
        .bind(&record.name)
        .bind(record.phone.as_deref())
        .bind(record.street.as_deref())
        .bind(record.city.as_deref())
        .bind(record.state.as_deref())
        .bind(record.email.as_deref())
        .bind(record.company.slug())
        .bind(record.source_url.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

type SummaryRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    String,
);

/// Summaries of every job in a run, in finalization order.
pub async fn list_job_summaries(pool: &SqlitePool, run_id: &str) -> Result<Vec<JobSummary>> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        "SELECT id, company, state, termination, entry_url, record_count, pages_visited,
                fetch_attempts, blocks_encountered, rediscoveries, total_waited_secs, finished_at
         FROM job_results WHERE run_id = ? ORDER BY finished_at, rowid",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(
            |(
                id,
                company,
                state,
                termination,
                entry_url,
                record_count,
                pages_visited,
                fetch_attempts,
                blocks_encountered,
                rediscoveries,
                total_waited_secs,
                finished_at,
            )| {
                Ok(JobSummary {
                    id,
                    key: WorkItemKey::new(decode_company(&company)?, state),
                    termination: termination.parse().map_err(|e| {
                        DatabaseError::Decode(format!("job_results.termination: {e}"))
                    })?,
                    entry_url,
                    record_count: usize::try_from(record_count).unwrap_or(0),
                    stats: JobStats {
                        pages_visited: to_u32(pages_visited),
                        fetch_attempts: to_u32(fetch_attempts),
                        blocks_encountered: to_u32(blocks_encountered),
                        rediscoveries: to_u32(rediscoveries),
                        total_waited_secs: u64::try_from(total_waited_secs).unwrap_or(0),
                    },
                    finished_at: parse_timestamp(&finished_at)?,
                })
            },
        )
        .collect()
}

type RecordRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
);

/// Every record of a run, grouped by job in finalization order, then extraction order.
pub async fn list_records(pool: &SqlitePool, run_id: &str) -> Result<Vec<AdvisorRecord>> {
    let rows = sqlx::query_as::<_, RecordRow>(
        "SELECT r.name, r.phone, r.street, r.city, r.state, r.email, r.company, r.source_url
         FROM advisor_records r
         JOIN job_results j ON j.id = r.job_id
         WHERE j.run_id = ?
         ORDER BY j.finished_at, j.rowid, r.seq",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(
            |(name, phone, street, city, state, email, company, source_url)| {
                Ok(AdvisorRecord {
                    name,
                    phone,
                    street,
                    city,
                    state,
                    email,
                    company: decode_company(&company)?,
                    source_url,
                })
            },
        )
        .collect()
}

fn decode_company(raw: &str) -> Result<Company> {
    raw.parse()
        .map_err(|e| DatabaseError::Decode(format!("company: {e}")))
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
