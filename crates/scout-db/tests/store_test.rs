//! Run recording and export against a file-backed database.

use chrono::Utc;
use scout_core::{
    AdvisorRecord, Company, JobResult, JobStats, OutputConfig, OutputFormat, ResolvedUrl,
    TerminationReason, UrlSource, WorkItemKey,
};
use scout_db::{export_run, Database, ResultSink, RunRecorder, UrlCacheStore};
use std::sync::Arc;

fn result(state: &str, names: &[&str], termination: TerminationReason) -> JobResult {
    let now = Utc::now();
    JobResult {
        key: WorkItemKey::new(Company::Ubs, state),
        records: names
            .iter()
            .map(|n| {
                let mut r = AdvisorRecord::new(*n, Company::Ubs);
                r.phone = Some("212-555-0100".to_string());
                r
            })
            .collect(),
        termination,
        entry_url: Some(Company::Ubs.seed_url().to_string()),
        stats: JobStats::default(),
        started_at: now,
        finished_at: now,
    }
}

#[tokio::test]
async fn test_recorded_run_exports_deduplicated_records() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = Arc::new(
        Database::new(dir.path().join("scout.db"))
            .await
            .expect("open database"),
    );
    let recorder = RunRecorder::start(db.clone(), "full").await.expect("start run");

    recorder
        .accept(&result("Ohio", &["Jane Doe", "John Roe"], TerminationReason::Completed))
        .await
        .expect("accept first");
    recorder
        .accept(&result("Texas", &["jane doe"], TerminationReason::RetriesExhausted))
        .await
        .expect("accept partial");
    recorder
        .save(&ResolvedUrl {
            key: WorkItemKey::new(Company::Ubs, "Texas"),
            url: "https://www.ubs.com/us/en/find".to_string(),
            confirmed_at: Utc::now(),
            source: UrlSource::Discovered,
        })
        .await
        .expect("save url");
    recorder.finish().await.expect("finish run");

    let output = OutputConfig {
        directory: dir.path().join("exports"),
        format: OutputFormat::Both,
        dedup: true,
        database: None,
    };
    let summary = export_run(&db, recorder.run_id(), &output, "20260101_120000")
        .await
        .expect("export");

    assert_eq!(summary.total_records, 3);
    assert_eq!(summary.exported_records, 2);
    assert_eq!(
        summary.csv_path,
        Some(output.directory.join("wealth_advisors_20260101_120000.csv"))
    );
    assert!(summary.json_path.as_deref().is_some_and(std::path::Path::exists));
    assert!(summary.urls_path.as_deref().is_some_and(std::path::Path::exists));
}

#[tokio::test]
async fn test_url_cache_survives_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("scout.db");
    let key = WorkItemKey::new(Company::MerrillLynch, "Florida");

    {
        let db = Arc::new(Database::new(&path).await.expect("open database"));
        let recorder = RunRecorder::start(db.clone(), "discover").await.expect("start");
        recorder
            .save(&ResolvedUrl {
                key: key.clone(),
                url: "https://advisor.ml.com/fl".to_string(),
                confirmed_at: Utc::now(),
                source: UrlSource::Discovered,
            })
            .await
            .expect("save");
        db.close().await;
    }

    let db = Arc::new(Database::new(&path).await.expect("reopen"));
    let recorder = RunRecorder::start(db, "full").await.expect("start");
    let urls = recorder.load_all().await.expect("load");
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].key, key);
    assert_eq!(urls[0].url, "https://advisor.ml.com/fl");
}

#[tokio::test]
async fn test_json_only_export_skips_csv() {
    let db = Database::in_memory().await.expect("open database");
    let dir = tempfile::tempdir().expect("temp dir");
    let run = scout_db::job_results::start_run(db.pool(), "test")
        .await
        .expect("start run");

    let output = OutputConfig {
        directory: dir.path().to_path_buf(),
        format: OutputFormat::Json,
        dedup: false,
        database: None,
    };
    let summary = export_run(&db, &run, &output, "stamp").await.expect("export");

    assert!(summary.csv_path.is_none());
    assert!(summary.json_path.is_some());
    assert!(summary.urls_path.is_none());
    assert_eq!(summary.exported_records, 0);
}
