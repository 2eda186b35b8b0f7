//! End-of-run summary printed to the operator.

use scout_core::Company;
use scout_db::{ExportSummary, JobSummary};
use std::collections::BTreeMap;
use std::fmt;

/// Totals over the stored job results of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    items: usize,
    records: usize,
    blocks: u64,
    rediscoveries: u64,
    waited_secs: u64,
    per_company: BTreeMap<Company, usize>,
    per_termination: BTreeMap<&'static str, usize>,
    export: ExportSummary,
}

impl RunSummary {
    pub fn new(jobs: &[JobSummary], export: ExportSummary) -> Self {
        let mut summary = Self {
            items: jobs.len(),
            export,
            ..Self::default()
        };
        for job in jobs {
            summary.records += job.record_count;
            summary.blocks += u64::from(job.stats.blocks_encountered);
            summary.rediscoveries += u64::from(job.stats.rediscoveries);
            summary.waited_secs += job.stats.total_waited_secs;
            *summary.per_company.entry(job.key.company).or_default() += job.record_count;
            *summary
                .per_termination
                .entry(job.termination.as_str())
                .or_default() += 1;
        }
        summary
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scraping summary")?;
        writeln!(f, "  work items:       {}", self.items)?;
        writeln!(
            f,
            "  records:          {} ({} exported)",
            self.records, self.export.exported_records
        )?;
        writeln!(f, "  blocks:           {}", self.blocks)?;
        writeln!(f, "  rediscoveries:    {}", self.rediscoveries)?;
        writeln!(f, "  waited:           {}s", self.waited_secs)?;

        if !self.per_company.is_empty() {
            writeln!(f, "By company:")?;
            for (company, count) in &self.per_company {
                writeln!(f, "  {:<16}  {count}", company.display_name())?;
            }
        }
        if !self.per_termination.is_empty() {
            writeln!(f, "By termination:")?;
            for (reason, count) in &self.per_termination {
                writeln!(f, "  {reason:<22}  {count}")?;
            }
        }

        for path in [
            &self.export.csv_path,
            &self.export.json_path,
            &self.export.urls_path,
        ]
        .into_iter()
        .flatten()
        {
            writeln!(f, "Saved {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::{JobStats, TerminationReason, WorkItemKey};
    use std::path::PathBuf;

    fn job(company: Company, termination: TerminationReason, records: usize) -> JobSummary {
        JobSummary {
            id: format!("{company}-{records}"),
            key: WorkItemKey::new(company, "Ohio"),
            termination,
            entry_url: None,
            record_count: records,
            stats: JobStats {
                blocks_encountered: 2,
                total_waited_secs: 30,
                ..JobStats::default()
            },
            finished_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_summary_groups_by_company_and_termination() {
        let jobs = vec![
            job(Company::Ubs, TerminationReason::Completed, 4),
            job(Company::Ubs, TerminationReason::RetriesExhausted, 1),
            job(Company::MerrillLynch, TerminationReason::Completed, 2),
        ];
        let export = ExportSummary {
            total_records: 7,
            exported_records: 6,
            csv_path: Some(PathBuf::from("out/wealth_advisors_x.csv")),
            ..ExportSummary::default()
        };

        let text = RunSummary::new(&jobs, export).to_string();
        assert!(text.contains("work items:       3"));
        assert!(text.contains("records:          7 (6 exported)"));
        assert!(text.contains("blocks:           6"));
        assert!(text.contains("waited:           90s"));
        assert!(text.contains("UBS               5"));
        assert!(text.contains("Merrill Lynch     2"));
        assert!(text.contains("completed               2"));
        assert!(text.contains("retries_exhausted       1"));
        assert!(text.contains("Saved out/wealth_advisors_x.csv"));
    }
}
