//! Drives a directory landing page to the listing for one state.

use scout_browser::{BrowserActions, BrowserError, PageContent};
use scout_llm::{Judgment, Reasoner};
use std::sync::Arc;

const PLAN_PROMPT: &str = r#"I need to search this financial advisor directory for advisors located in a given state.
Analyze the page and provide a step-by-step strategy: search fields, location or state filters,
menus leading to an advisor search, "find an advisor" buttons.

Use "{state}" in a value where the state name must be entered.

Respond with JSON:
{
    "strategy": "direct_search|navigate_first|complex_form",
    "steps": [
        {
            "action": "fill|click|select|navigate",
            "selector": "css selector",
            "value": "value to enter, option to select or URL to open",
            "description": "what this step does"
        }
    ]
}"#;

/// Search inputs tried when no plan is available, most specific first.
pub const FALLBACK_SELECTORS: &[&str] = &[
    "input[placeholder*='location' i]",
    "input[placeholder*='city' i]",
    "input[placeholder*='state' i]",
    "input[name*='location' i]",
    "input[id*='location' i]",
    "input[type='search']",
    "input[name*='search']",
    "#location",
    "#search",
    ".search-input",
];

/// One browser step proposed by the reasoner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationStep {
    /// Type a value into a field
    Fill { selector: String, value: String },
    /// Click an element
    Click { selector: String },
    /// Choose an option of a `<select>`
    Select { selector: String, value: String },
    /// Open a URL
    Navigate { url: String },
}

/// Parse a step plan, substituting `{state}`; unusable steps are skipped.
#[must_use]
pub fn parse_plan(judgment: &Judgment, state: &str) -> Vec<NavigationStep> {
    judgment
        .array_field("steps")
        .iter()
        .filter_map(|raw| Judgment::from_value(raw.clone()))
        .filter_map(|step| {
            let selector = step.str_field("selector").map(str::to_string);
            let value = step
                .str_field("value")
                .map(|v| v.replace("{state}", state))
                .unwrap_or_default();
            match step.str_field("action")?.to_lowercase().as_str() {
                "fill" => Some(NavigationStep::Fill {
                    selector: selector?,
                    value,
                }),
                "click" => Some(NavigationStep::Click {
                    selector: selector?,
                }),
                "select" => Some(NavigationStep::Select {
                    selector: selector?,
                    value,
                }),
                "navigate" if !value.is_empty() => Some(NavigationStep::Navigate { url: value }),
                _ => None,
            }
        })
        .collect()
}

/// Best-effort state search on a directory landing page.
pub struct StateSearchNavigator {
    reasoner: Arc<dyn Reasoner>,
}

impl StateSearchNavigator {
    /// Create a navigator.
    #[must_use]
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Search the landing page for `state`.
    ///
    /// Returns whether any step took effect. Step failures are logged and
    /// skipped; only a fatal browser error is returned.
    pub async fn search_state(
        &self,
        browser: &dyn BrowserActions,
        landing: &PageContent,
        state: &str,
    ) -> Result<bool, BrowserError> {
        let prompt = format!(
            "{PLAN_PROMPT}\n\nState: {state}\nURL: {}\nPage title: {}",
            landing.url,
            landing.title.as_deref().unwrap_or("")
        );

        let plan = match self.reasoner.reason(&prompt, &landing.html).await {
            Ok(judgment) => parse_plan(&judgment, state),
            Err(e) => {
                tracing::warn!(state, error = %e, "Search plan reasoning failed");
                Vec::new()
            }
        };

        let mut applied = 0usize;
        for step in &plan {
            match execute_step(browser, step).await {
                Ok(()) => applied += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(?step, error = %e, "Search step failed"),
            }
        }
        if applied > 0 {
            tracing::debug!(state, applied, total = plan.len(), "Search plan executed");
            return Ok(true);
        }

        self.fallback_search(browser, state).await
    }

    async fn fallback_search(
        &self,
        browser: &dyn BrowserActions,
        state: &str,
    ) -> Result<bool, BrowserError> {
        tracing::debug!(state, "Attempting fallback search");
        for selector in FALLBACK_SELECTORS {
            match browser.fill_field(selector, state).await {
                Ok(()) => {
                    match browser.submit(selector).await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => tracing::debug!(selector, error = %e, "Submit failed"),
                    }
                    tracing::info!(selector, state, "Fallback search submitted");
                    return Ok(true);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => continue,
            }
        }
        tracing::warn!(state, "No search field found on landing page");
        Ok(false)
    }
}

async fn execute_step(browser: &dyn BrowserActions, step: &NavigationStep) -> Result<(), BrowserError> {
    match step {
        NavigationStep::Fill { selector, value } => browser.fill_field(selector, value).await,
        NavigationStep::Click { selector } => browser.click(selector).await,
        NavigationStep::Select { selector, value } => browser.select_option(selector, value).await,
        NavigationStep::Navigate { url } => browser.navigate(url).await.map(|_| ()),
    }
}
