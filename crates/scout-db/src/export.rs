//! CSV/JSON export of a run's records and discovered entry points.

use crate::error::Result;
use crate::{job_results, url_cache, Database};
use scout_core::{AdvisorRecord, OutputConfig, ResolvedUrl, UrlSource};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Flat export row; column order is the CSV header order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    name: &'a str,
    phone: Option<&'a str>,
    street: Option<&'a str>,
    city: Option<&'a str>,
    state: Option<&'a str>,
    email: Option<&'a str>,
    company: &'static str,
    url: Option<&'a str>,
}

impl<'a> From<&'a AdvisorRecord> for ExportRow<'a> {
    fn from(record: &'a AdvisorRecord) -> Self {
        Self {
            name: &record.name,
            phone: record.phone.as_deref(),
            street: record.street.as_deref(),
            city: record.city.as_deref(),
            state: record.state.as_deref(),
            email: record.email.as_deref(),
            company: record.company.display_name(),
            url: record.source_url.as_deref(),
        }
    }
}

/// Files written by [`export_run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Records loaded for the run
    pub total_records: usize,
    /// Records written after deduplication
    pub exported_records: usize,
    /// CSV file, if written
    pub csv_path: Option<PathBuf>,
    /// JSON file, if written
    pub json_path: Option<PathBuf>,
    /// Discovered-URL file, if any URL was discovered
    pub urls_path: Option<PathBuf>,
}

/// Drop records whose (lower-cased name, phone digits) key was already seen.
///
/// The first occurrence wins and order is otherwise preserved.
#[must_use]
pub fn dedup_records(records: Vec<AdvisorRecord>) -> Vec<AdvisorRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}

/// Write records as CSV with a header row.
pub fn write_csv(path: &Path, records: &[AdvisorRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(ExportRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write records as a pretty-printed JSON array.
pub fn write_json(path: &Path, records: &[AdvisorRecord]) -> Result<()> {
    let rows: Vec<ExportRow<'_>> = records.iter().map(ExportRow::from).collect();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &rows)?;
    writer.flush()?;
    Ok(())
}

/// Write discovered entry points as a JSON array.
pub fn write_discovered_urls(path: &Path, urls: &[ResolvedUrl]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, urls)?;
    writer.flush()?;
    Ok(())
}

/// Local timestamp used in export file names.
#[must_use]
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Export a run into `output.directory`, naming files with `stamp`.
///
/// Produces `wealth_advisors_<stamp>.csv` / `.json` according to the format,
/// and `discovered_urls_<stamp>.json` when the cache holds discovered entries.
pub async fn export_run(
    db: &Database,
    run_id: &str,
    output: &OutputConfig,
    stamp: &str,
) -> Result<ExportSummary> {
    std::fs::create_dir_all(&output.directory)?;

    let records = job_results::list_records(db.pool(), run_id).await?;
    let total_records = records.len();
    let records = if output.dedup {
        dedup_records(records)
    } else {
        records
    };

    let mut summary = ExportSummary {
        total_records,
        exported_records: records.len(),
        ..ExportSummary::default()
    };

    let base = format!("wealth_advisors_{stamp}");
    if output.format.writes_csv() {
        let path = output.directory.join(format!("{base}.csv"));
        write_csv(&path, &records)?;
        tracing::info!(path = %path.display(), records = records.len(), "CSV export written");
        summary.csv_path = Some(path);
    }
    if output.format.writes_json() {
        let path = output.directory.join(format!("{base}.json"));
        write_json(&path, &records)?;
        tracing::info!(path = %path.display(), records = records.len(), "JSON export written");
        summary.json_path = Some(path);
    }

    let discovered: Vec<ResolvedUrl> = url_cache::list_urls(db.pool())
        .await?
        .into_iter()
        .filter(|u| u.source == UrlSource::Discovered)
        .collect();
    if !discovered.is_empty() {
        let path = output.directory.join(format!("discovered_urls_{stamp}.json"));
        write_discovered_urls(&path, &discovered)?;
        summary.urls_path = Some(path);
    }

    if total_records != summary.exported_records {
        tracing::info!(
            dropped = total_records - summary.exported_records,
            "Duplicate records dropped at export"
        );
    }

    Ok(summary)
}
