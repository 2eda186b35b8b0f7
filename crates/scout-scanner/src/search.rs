//! Web search collaborator used by URL rediscovery.

use crate::error::SearchError;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;

/// Results kept per query.
const MAX_RESULTS: usize = 10;

/// DuckDuckGo HTML endpoint.
const DDG_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// `search(query) -> ordered candidate URLs`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a query and return result URLs in rank order.
    async fn search(&self, query: &str) -> Result<Vec<String>, SearchError>;
}

/// Search through DuckDuckGo's HTML interface.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    /// Create a search client.
    pub fn new(timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
        tracing::debug!(query, "DuckDuckGo search");

        let response = self
            .client
            .post(DDG_SEARCH_URL)
            .form(&[("q", query), ("kl", "us-en")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Unavailable(format!(
                "DuckDuckGo returned {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let results = parse_results(&html)?;
        tracing::debug!(count = results.len(), "Parsed search results");
        Ok(results)
    }
}

/// Extract the first [`MAX_RESULTS`] result URLs from a DuckDuckGo HTML
/// results page, without duplicates.
pub fn parse_results(html: &str) -> Result<Vec<String>, SearchError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a.result__a")
        .map_err(|e| SearchError::Parse(format!("invalid result selector: {e:?}")))?;

    let mut seen = HashSet::new();
    Ok(document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(unwrap_redirect)
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_RESULTS)
        .collect())
}

/// DuckDuckGo wraps results in `//duckduckgo.com/l/?uddg=<encoded>` redirects.
fn unwrap_redirect(href: &str) -> Option<String> {
    if href.contains("duckduckgo.com/l/") {
        let start = href.find("uddg=")? + "uddg=".len();
        let encoded = &href[start..];
        let end = encoded.find('&').unwrap_or(encoded.len());
        urlencoding::decode(&encoded[..end])
            .ok()
            .map(|s| s.into_owned())
    } else if href.starts_with("http://") || href.starts_with("https://") {
        Some(href.to_string())
    } else if let Some(rest) = href.strip_prefix("//") {
        Some(format!("https://{rest}"))
    } else {
        None
    }
}
