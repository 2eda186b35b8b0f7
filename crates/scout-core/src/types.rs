//! Shared domain types used across Scout.
//!
//! A scraping run is planned as a set of [`WorkItem`]s (one company, one state).
//! Each item is driven to completion independently and finalized as a [`JobResult`].

use crate::error::ScoutError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Financial institutions with a supported advisor directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Company {
    /// UBS Wealth Management
    Ubs,
    /// Morgan Stanley Wealth Management
    MorganStanley,
    /// Merrill Lynch (Bank of America)
    MerrillLynch,
}

impl Company {
    /// Every supported company, in catalog order.
    pub const ALL: [Company; 3] = [Self::Ubs, Self::MorganStanley, Self::MerrillLynch];

    /// Human-readable company name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ubs => "UBS",
            Self::MorganStanley => "Morgan Stanley",
            Self::MerrillLynch => "Merrill Lynch",
        }
    }

    /// Stable lowercase identifier used for storage keys and file names.
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Ubs => "ubs",
            Self::MorganStanley => "morgan-stanley",
            Self::MerrillLynch => "merrill-lynch",
        }
    }

    /// Known directory entry point, used until a discovered URL replaces it.
    #[must_use]
    pub fn seed_url(&self) -> &'static str {
        match self {
            Self::Ubs => "https://www.ubs.com/us/en/wealth-management/find-an-advisor.html",
            Self::MorganStanley => "https://advisor.morganstanley.com/search",
            Self::MerrillLynch => "https://advisor.ml.com/search?bylocation=true",
        }
    }

    /// Search terms used when the entry point has to be rediscovered.
    #[must_use]
    pub fn search_terms(&self) -> &'static str {
        match self {
            Self::Ubs => "UBS financial advisor directory United States",
            Self::MorganStanley => "Morgan Stanley financial advisor directory search",
            Self::MerrillLynch => "Merrill Lynch financial advisor directory search location",
        }
    }
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Company {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "ubs" => Ok(Self::Ubs),
            "morganstanley" | "ms" => Ok(Self::MorganStanley),
            "merrilllynch" | "merrill" | "ml" => Ok(Self::MerrillLynch),
            _ => Err(ScoutError::UnknownCompany(s.trim().to_string())),
        }
    }
}

/// Identity of one scraping unit, usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkItemKey {
    /// Company whose directory is scraped
    pub company: Company,
    /// Target state, as given in the plan
    pub state: String,
}

impl WorkItemKey {
    /// Create a key for a company and state.
    #[must_use]
    pub fn new(company: Company, state: impl Into<String>) -> Self {
        Self {
            company,
            state: state.into().trim().to_string(),
        }
    }
}

impl fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.company, self.state)
    }
}

/// One company × one state. Never mutated once planned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Company whose directory is scraped
    pub company: Company,
    /// Target state
    pub state: String,
}

impl WorkItem {
    /// Create a new work item.
    #[must_use]
    pub fn new(company: Company, state: impl Into<String>) -> Self {
        Self {
            company,
            state: state.into().trim().to_string(),
        }
    }

    /// The cache/identity key of this item.
    #[must_use]
    pub fn key(&self) -> WorkItemKey {
        WorkItemKey::new(self.company, self.state.clone())
    }
}

/// Where a resolved directory URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlSource {
    /// Previously confirmed entry read back from the cache
    Cache,
    /// Found by the search-then-reason discovery procedure
    Discovered,
    /// Built-in catalog entry point, not yet confirmed
    Seed,
}

impl UrlSource {
    /// Storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Discovered => "discovered",
            Self::Seed => "seed",
        }
    }
}

impl FromStr for UrlSource {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache" => Ok(Self::Cache),
            "discovered" => Ok(Self::Discovered),
            "seed" => Ok(Self::Seed),
            other => Err(ScoutError::Validation(format!("unknown url source '{other}'"))),
        }
    }
}

/// A directory entry URL for one (company, state) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    /// Key this URL belongs to
    pub key: WorkItemKey,
    /// Directory entry URL
    pub url: String,
    /// When the URL was last confirmed working
    pub confirmed_at: DateTime<Utc>,
    /// Provenance of the URL
    pub source: UrlSource,
}

/// One advisor listing extracted from a directory page.
///
/// Only `name` is mandatory; records without a name are never emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorRecord {
    /// Full name
    pub name: String,
    /// Cleaned phone number
    pub phone: Option<String>,
    /// Street address
    pub street: Option<String>,
    /// City
    pub city: Option<String>,
    /// State
    pub state: Option<String>,
    /// Lower-cased email address
    pub email: Option<String>,
    /// Company whose directory listed the advisor
    pub company: Company,
    /// Page the record was extracted from
    pub source_url: Option<String>,
}

impl AdvisorRecord {
    /// Create a record with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>, company: Company) -> Self {
        Self {
            name: name.into(),
            phone: None,
            street: None,
            city: None,
            state: None,
            email: None,
            company,
            source_url: None,
        }
    }

    /// Key used by the export-stage deduplication: lower-cased name and phone digits.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String) {
        let digits = self
            .phone
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        (self.name.trim().to_lowercase(), digits)
    }
}

/// Why a work item loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Pagination ended naturally
    Completed,
    /// `max_pages_per_state` reached while more pages were available
    PageLimitReached,
    /// `max_advisors_per_item` reached
    RecordLimitReached,
    /// The retry policy gave up, or rediscovery failed
    RetriesExhausted,
    /// A condition outside the loop's control (browser unusable, no entry point at all)
    FatalAbort,
    /// Operator interrupt
    Interrupted,
}

impl TerminationReason {
    /// Storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PageLimitReached => "page_limit_reached",
            Self::RecordLimitReached => "record_limit_reached",
            Self::RetriesExhausted => "retries_exhausted",
            Self::FatalAbort => "fatal_abort",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminationReason {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "page_limit_reached" => Ok(Self::PageLimitReached),
            "record_limit_reached" => Ok(Self::RecordLimitReached),
            "retries_exhausted" => Ok(Self::RetriesExhausted),
            "fatal_abort" => Ok(Self::FatalAbort),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(ScoutError::Validation(format!(
                "unknown termination reason '{other}'"
            ))),
        }
    }
}

/// Diagnostics collected over one work item loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    /// Listing pages that classified as usable
    pub pages_visited: u32,
    /// Page fetches, including blocked ones
    pub fetch_attempts: u32,
    /// CAPTCHA / access-denied / JS-challenge / rate-limit encounters
    pub blocks_encountered: u32,
    /// Successful rediscoveries
    pub rediscoveries: u32,
    /// Seconds spent in policy-prescribed waits
    pub total_waited_secs: u64,
}

/// Final outcome of one work item, handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Work item identity
    pub key: WorkItemKey,
    /// Records in extraction order
    pub records: Vec<AdvisorRecord>,
    /// Why the loop stopped
    pub termination: TerminationReason,
    /// Entry URL used last, if any was resolved
    pub entry_url: Option<String>,
    /// Loop diagnostics
    pub stats: JobStats,
    /// When the loop started
    pub started_at: DateTime<Utc>,
    /// When the result was finalized
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    /// Whether the loop ended without reaching the end of the listing.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !matches!(self.termination, TerminationReason::Completed)
    }
}
