//! Advisor record extraction and normalization.
//!
//! Field extraction is delegated to the reasoner; this module owns turning
//! its loosely-typed answer into valid [`AdvisorRecord`]s.

use once_cell::sync::Lazy;
use regex::Regex;
use scout_browser::PageContent;
use scout_core::{AdvisorRecord, Company};
use scout_llm::{Judgment, Reasoner};
use serde_json::Value;
use std::sync::Arc;

static PHONE_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\d+\s\-()]").expect("valid phone regex"));
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("valid email regex")
});

const EXTRACT_PROMPT: &str = r#"Extract financial advisor information from this directory page.

Look for advisor listings containing full names, phone numbers, office addresses
(street, city, state) and email addresses. Only extract clear, complete information.

Respond with JSON:
{
    "has_advisors": boolean,
    "advisor_count": number,
    "advisors": [
        {
            "name": "Full Name",
            "phone": "phone number",
            "street": "street address",
            "city": "city",
            "state": "state",
            "email": "email address"
        }
    ]
}"#;

/// Keep digits, `+`, `-`, parentheses and spaces; `None` when nothing useful remains.
#[must_use]
pub fn clean_phone(raw: &str) -> Option<String> {
    let cleaned = PHONE_DISALLOWED.replace_all(raw, "");
    let cleaned = cleaned.trim();
    cleaned
        .chars()
        .any(|c| c.is_ascii_digit())
        .then(|| cleaned.to_string())
}

/// Lower-case an email address; `None` when it is not well-formed.
#[must_use]
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().trim_start_matches("mailto:").to_lowercase();
    EMAIL_PATTERN.is_match(&email).then_some(email)
}

fn text_field(raw: &Judgment, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn an extraction judgment into records; entries without a name are dropped.
#[must_use]
pub fn normalize_records(judgment: &Judgment, company: Company, source_url: &str) -> Vec<AdvisorRecord> {
    if judgment.bool_field("has_advisors") == Some(false) {
        return Vec::new();
    }

    let mut dropped = 0usize;
    let records: Vec<AdvisorRecord> = judgment
        .array_field("advisors")
        .iter()
        .filter_map(|raw| Judgment::from_value(raw.clone()))
        .filter_map(|raw| {
            let Some(name) = text_field(&raw, "name") else {
                dropped += 1;
                return None;
            };
            Some(AdvisorRecord {
                name,
                phone: text_field(&raw, "phone").and_then(|p| clean_phone(&p)),
                street: text_field(&raw, "street"),
                city: text_field(&raw, "city"),
                state: text_field(&raw, "state"),
                email: text_field(&raw, "email").and_then(|e| normalize_email(&e)),
                company,
                source_url: Some(source_url.to_string()).filter(|u| !u.is_empty()),
            })
        })
        .collect();

    if dropped > 0 {
        tracing::debug!(dropped, "Dropped advisor entries without a name");
    }
    records
}

/// Extracts advisor records from usable pages.
pub struct ExtractionEngine {
    reasoner: Arc<dyn Reasoner>,
}

impl ExtractionEngine {
    /// Create an engine backed by a reasoner.
    #[must_use]
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Records listed on `page`. A reasoning failure yields no records.
    pub async fn extract(&self, page: &PageContent, company: Company) -> Vec<AdvisorRecord> {
        let prompt = format!(
            "{EXTRACT_PROMPT}\n\nCompany: {}\nURL: {}",
            company.display_name(),
            page.url
        );

        match self.reasoner.reason(&prompt, &page.html).await {
            Ok(judgment) => {
                let records = normalize_records(&judgment, company, &page.url);
                tracing::info!(url = %page.url, count = records.len(), "Extracted advisors");
                records
            }
            Err(e) => {
                tracing::warn!(url = %page.url, error = %e, "Extraction reasoning failed");
                Vec::new()
            }
        }
    }
}
