//! Configuration management for Scout.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Company;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// States scraped when no explicit target list is configured.
pub const DEFAULT_TARGET_STATES: [&str; 19] = [
    "New York",
    "New Jersey",
    "Florida",
    "Texas",
    "California",
    "Illinois",
    "Massachusetts",
    "Georgia",
    "Washington",
    "Washington DC",
    "Virginia",
    "Maryland",
    "Michigan",
    "Connecticut",
    "Pennsylvania",
    "North Carolina",
    "Ohio",
    "Rhode Island",
    "Minnesota",
];

const KNOWN_PROVIDERS: [&str; 3] = ["anthropic", "openai", "ollama"];

/// Main application configuration.
///
/// This is loaded from `~/.config/scout/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Retry, backoff and pagination limits
    pub scraping: ScrapingConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Reasoning provider settings
    pub llm: LlmConfig,
    /// Entry-point discovery settings
    pub discovery: DiscoveryConfig,
    /// Output and persistence settings
    pub output: OutputConfig,
    /// Companies and states to scrape
    pub targets: TargetsConfig,
}

impl AppConfig {
    /// Load configuration from the default path, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// A `.env` file in the working directory is read first. Supported variables:
    /// - `SCOUT_CAPTCHA_WAIT_TIME`, `SCOUT_CAPTCHA_MAX_RETRIES`
    /// - `SCOUT_RATE_LIMIT_WAIT_TIME`, `SCOUT_ACCESS_DENIED_WAIT_TIME`
    /// - `SCOUT_MAX_PAGES_PER_STATE`, `SCOUT_MAX_ADVISORS`
    /// - `SCOUT_HEADLESS`, `SCOUT_BROWSER_TIMEOUT`
    /// - `SCOUT_LLM_PROVIDER`, `SCOUT_LLM_MODEL`
    /// - `ANTHROPIC_API_KEY` / `CLAUDE_API_KEY` / `OPENAI_API_KEY`
    /// - `SCOUT_OUTPUT_DIRECTORY`, `SCOUT_SAVE_FORMAT`
    /// - `SCOUT_TARGET_COMPANIES`, `SCOUT_TARGET_STATES` (comma-separated)
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", env_file.display());
        }

        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Numeric and boolean values that fail to parse are ignored with a warning.
    /// Unknown companies or output formats are rejected.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "SCOUT_CAPTCHA_WAIT_TIME", &mut self.scraping.captcha_wait_secs);
        override_parsed(
            &lookup,
            "SCOUT_CAPTCHA_MAX_RETRIES",
            &mut self.scraping.captcha_max_retries,
        );
        override_parsed(
            &lookup,
            "SCOUT_RATE_LIMIT_WAIT_TIME",
            &mut self.scraping.rate_limit_wait_secs,
        );
        override_parsed(
            &lookup,
            "SCOUT_ACCESS_DENIED_WAIT_TIME",
            &mut self.scraping.access_denied_wait_secs,
        );
        override_parsed(
            &lookup,
            "SCOUT_MAX_PAGES_PER_STATE",
            &mut self.scraping.max_pages_per_state,
        );
        override_parsed(&lookup, "SCOUT_MAX_ADVISORS", &mut self.scraping.max_advisors_per_item);
        override_parsed(&lookup, "SCOUT_HEADLESS", &mut self.browser.headless);
        override_parsed(
            &lookup,
            "SCOUT_BROWSER_TIMEOUT",
            &mut self.browser.navigation_timeout_secs,
        );

        if let Some(provider) = lookup("SCOUT_LLM_PROVIDER") {
            self.llm.provider = provider.trim().to_lowercase();
        }
        if let Some(model) = lookup("SCOUT_LLM_MODEL") {
            self.llm.model = Some(model.trim().to_string());
        }

        let key_vars: &[&str] = if self.llm.provider == "openai" {
            &["OPENAI_API_KEY"]
        } else {
            &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"]
        };
        if let Some(key) = key_vars
            .iter()
            .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()))
        {
            self.llm.api_key = Some(key.trim().to_string());
        }

        if let Some(dir) = lookup("SCOUT_OUTPUT_DIRECTORY") {
            self.output.directory = PathBuf::from(dir.trim());
        }
        if let Some(format) = lookup("SCOUT_SAVE_FORMAT") {
            self.output.format = format.parse()?;
        }

        if let Some(list) = lookup("SCOUT_TARGET_COMPANIES") {
            self.targets.companies = split_list(&list)
                .map(|name| {
                    Company::from_str(name)
                        .map_err(|e| ConfigError::invalid("targets.companies", e.to_string()))
                })
                .collect::<ConfigResult<Vec<_>>>()?;
        }
        if let Some(list) = lookup("SCOUT_TARGET_STATES") {
            self.targets.states = split_list(&list).map(str::to_string).collect();
        }

        Ok(())
    }

    /// Check that values are mutually consistent.
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.scraping;
        if s.max_pages_per_state == 0 {
            return Err(ConfigError::invalid(
                "scraping.max_pages_per_state",
                "must be at least 1",
            ));
        }
        if s.max_attempts == 0 {
            return Err(ConfigError::invalid("scraping.max_attempts", "must be at least 1"));
        }
        if s.concurrent_items == 0 {
            return Err(ConfigError::invalid(
                "scraping.concurrent_items",
                "must be at least 1",
            ));
        }
        if s.max_empty_pages == 0 {
            return Err(ConfigError::invalid("scraping.max_empty_pages", "must be at least 1"));
        }
        if s.max_delay_ms < s.min_delay_ms {
            return Err(ConfigError::invalid(
                "scraping.max_delay_ms",
                format!("{} is below min_delay_ms ({})", s.max_delay_ms, s.min_delay_ms),
            ));
        }
        if !KNOWN_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::invalid(
                "llm.provider",
                format!(
                    "'{}' is not one of {}",
                    self.llm.provider,
                    KNOWN_PROVIDERS.join(", ")
                ),
            ));
        }
        if self.llm.max_content_chars == 0 {
            return Err(ConfigError::invalid("llm.max_content_chars", "must be at least 1"));
        }
        if self.discovery.max_candidates == 0 {
            return Err(ConfigError::invalid(
                "discovery.max_candidates",
                "must be at least 1",
            ));
        }
        if self.targets.companies.is_empty() {
            return Err(ConfigError::invalid("targets.companies", "no companies configured"));
        }
        Ok(())
    }

    /// Settings consumed by the scraping controller.
    #[must_use]
    pub fn scrape_settings(&self) -> ScrapeSettings {
        let s = &self.scraping;
        ScrapeSettings {
            captcha_wait: Duration::from_secs(s.captcha_wait_secs),
            captcha_max_retries: s.captcha_max_retries,
            rate_limit_wait: Duration::from_secs(s.rate_limit_wait_secs),
            access_denied_wait: Duration::from_secs(s.access_denied_wait_secs),
            access_denied_max_retries: s.access_denied_max_retries,
            js_challenge_wait: Duration::from_secs(s.js_challenge_wait_secs),
            max_attempts: s.max_attempts,
            max_pages_per_state: s.max_pages_per_state,
            max_empty_pages: s.max_empty_pages,
            max_advisors_per_item: s.max_advisors_per_item,
            max_rediscoveries: s.max_rediscoveries,
            min_delay: Duration::from_millis(s.min_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            concurrent_items: s.concurrent_items,
            headless: self.browser.headless,
        }
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/scout/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "scout", "scout").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn override_parsed<T, F>(lookup: &F, var: &str, target: &mut T)
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::debug!("Override from env {}: {}", var, value);
            *target = value;
        }
        Err(_) => tracing::warn!("Ignoring unparsable value for {}: {:?}", var, raw),
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Retry, backoff and traversal limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Wait after a CAPTCHA challenge, in seconds
    pub captcha_wait_secs: u64,
    /// Consecutive blocks tolerated before giving up
    pub captcha_max_retries: u32,
    /// Base wait after a rate limit, in seconds (scaled by attempt count)
    pub rate_limit_wait_secs: u64,
    /// Wait after an access-denied page, in seconds
    pub access_denied_wait_secs: u64,
    /// Access-denied attempts tolerated before giving up
    pub access_denied_max_retries: u32,
    /// Short wait for a JavaScript challenge to clear, in seconds
    pub js_challenge_wait_secs: u64,
    /// Hard cap on non-usable verdicts per work item
    pub max_attempts: u32,
    /// Maximum listing pages per work item
    pub max_pages_per_state: u32,
    /// Consecutive empty pages that end a listing
    pub max_empty_pages: u32,
    /// Maximum records collected per work item
    pub max_advisors_per_item: usize,
    /// Maximum entry-point rediscoveries per work item
    pub max_rediscoveries: u32,
    /// Minimum politeness delay between pages, in milliseconds
    pub min_delay_ms: u64,
    /// Maximum politeness delay between pages, in milliseconds
    pub max_delay_ms: u64,
    /// Work items scraped concurrently
    pub concurrent_items: usize,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            captcha_wait_secs: 30,
            captcha_max_retries: 3,
            rate_limit_wait_secs: 60,
            access_denied_wait_secs: 120,
            access_denied_max_retries: 3,
            js_challenge_wait_secs: 5,
            max_attempts: 12,
            max_pages_per_state: 50,
            max_empty_pages: 3,
            max_advisors_per_item: 10_000,
            max_rediscoveries: 2,
            min_delay_ms: 2000,
            max_delay_ms: 5000,
            concurrent_items: 3,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode (a visible browser lets an operator solve CAPTCHAs)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
        }
    }
}

/// Reasoning provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider: `anthropic`, `openai`, or `ollama`
    pub provider: String,
    /// Model override; the provider default is used when absent
    pub model: Option<String>,
    /// API key, read from the environment only
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Ollama server URL
    pub ollama_url: String,
    /// Reasoning call timeout in seconds
    pub timeout_secs: u64,
    /// Page content characters sent per reasoning call
    pub max_content_chars: usize,
    /// Maximum tokens for completions
    pub max_tokens: u32,
    /// Temperature for completions
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: None,
            api_key: None,
            ollama_url: "http://localhost:11434".to_string(),
            timeout_secs: 60,
            max_content_chars: 4000,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

/// Entry-point discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Candidates verified before discovery is declared exhausted
    pub max_candidates: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { max_candidates: 5 }
    }
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CSV only
    Csv,
    /// JSON only
    Json,
    /// Both CSV and JSON
    Both,
}

impl OutputFormat {
    /// Whether a CSV file is written.
    #[must_use]
    pub fn writes_csv(self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }

    /// Whether a JSON file is written.
    #[must_use]
    pub fn writes_json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "both" => Ok(Self::Both),
            other => Err(ConfigError::invalid(
                "output.format",
                format!("'{other}' is not one of csv, json, both"),
            )),
        }
    }
}

/// Output and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving exports and the default database
    pub directory: PathBuf,
    /// Export format
    pub format: OutputFormat,
    /// Drop duplicate records at export
    pub dedup: bool,
    /// SQLite database path; defaults to `<directory>/scout.db`
    pub database: Option<PathBuf>,
}

impl OutputConfig {
    /// Effective database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.directory.join("scout.db"))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./scraped_data"),
            format: OutputFormat::Both,
            dedup: true,
            database: None,
        }
    }
}

/// Companies and states to scrape in a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Target companies
    pub companies: Vec<Company>,
    /// Target states
    pub states: Vec<String>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            companies: Company::ALL.to_vec(),
            states: DEFAULT_TARGET_STATES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Named options consumed by the scraping controller, derived from [`AppConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSettings {
    /// Wait after a CAPTCHA challenge
    pub captcha_wait: Duration,
    /// Consecutive blocks tolerated before giving up
    pub captcha_max_retries: u32,
    /// Base rate-limit wait, scaled by attempt count
    pub rate_limit_wait: Duration,
    /// Wait after an access-denied page
    pub access_denied_wait: Duration,
    /// Access-denied attempts tolerated before giving up
    pub access_denied_max_retries: u32,
    /// Wait for a JavaScript challenge to clear
    pub js_challenge_wait: Duration,
    /// Hard cap on non-usable verdicts per item
    pub max_attempts: u32,
    /// Maximum listing pages per item
    pub max_pages_per_state: u32,
    /// Consecutive empty pages that end a listing
    pub max_empty_pages: u32,
    /// Maximum records per item
    pub max_advisors_per_item: usize,
    /// Maximum rediscoveries per item
    pub max_rediscoveries: u32,
    /// Lower bound of the politeness delay
    pub min_delay: Duration,
    /// Upper bound of the politeness delay
    pub max_delay: Duration,
    /// Items scraped concurrently
    pub concurrent_items: usize,
    /// Whether an operator can see the browser
    pub headless: bool,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        AppConfig::default().scrape_settings()
    }
}
