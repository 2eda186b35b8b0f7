//! Scripted collaborators shared by the scanner integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use scout_browser::{BrowserActions, BrowserError, PageContent, SessionFactory};
use scout_core::{ScrapeSettings, WorkItemKey};
use scout_db::MemoryStore;
use scout_llm::{Judgment, LlmError, Reasoner};
use scout_scanner::{
    CandidateVerifier, PageClassifier, SearchError, SearchProvider, SessionOrchestrator,
    UrlResolver,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted site answers for one navigation.
#[derive(Debug, Clone)]
pub enum Reply {
    Page(PageContent),
    Closed,
    Timeout,
}

/// A fake website: per-URL reply queues. The last reply of a queue repeats.
#[derive(Default)]
pub struct Site {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    visits: Mutex<Vec<String>>,
}

impl Site {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn page(&self, url: &str, html: impl Into<String>) -> &Self {
        self.reply(url, Reply::Page(PageContent::new(url, html)))
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    fn next(&self, url: &str) -> Result<PageContent, BrowserError> {
        self.visits.lock().unwrap().push(url.to_string());
        self.pop(url)
    }

    /// Next reply for a route that is not a navigation; `None` when unrouted.
    fn action(&self, route: &str) -> Option<Result<PageContent, BrowserError>> {
        if !self.replies.lock().unwrap().contains_key(route) {
            return None;
        }
        Some(self.pop(route))
    }

    fn pop(&self, url: &str) -> Result<PageContent, BrowserError> {
        let mut replies = self.replies.lock().unwrap();
        let Some(queue) = replies.get_mut(url) else {
            return Err(BrowserError::NavigationError(format!("no route to {url}")));
        };
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match reply {
            Some(Reply::Page(page)) => Ok(page),
            Some(Reply::Closed) => Err(BrowserError::SessionClosed),
            Some(Reply::Timeout) | None => Err(BrowserError::Timeout("30s".to_string())),
        }
    }
}

/// One tab on the scripted site. Forms never exist.
///
/// A click on `selector` answers from the `click:{selector}` route when one
/// is scripted. Re-reading the tab answers from `reread:{url}` when scripted.
pub struct Tab {
    site: Arc<Site>,
    current: Mutex<Option<PageContent>>,
}

#[async_trait]
impl BrowserActions for Tab {
    async fn navigate(&self, url: &str) -> scout_browser::Result<PageContent> {
        let page = self.site.next(url)?;
        *self.current.lock().unwrap() = Some(page.clone());
        Ok(page)
    }

    async fn fill_field(&self, selector: &str, _value: &str) -> scout_browser::Result<()> {
        Err(BrowserError::SelectorNotFound(selector.to_string()))
    }

    async fn click(&self, selector: &str) -> scout_browser::Result<()> {
        match self.site.action(&format!("click:{selector}")) {
            Some(page) => {
                *self.current.lock().unwrap() = Some(page?);
                Ok(())
            }
            None => Err(BrowserError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn submit(&self, selector: &str) -> scout_browser::Result<()> {
        Err(BrowserError::SelectorNotFound(selector.to_string()))
    }

    async fn select_option(&self, selector: &str, _value: &str) -> scout_browser::Result<()> {
        Err(BrowserError::SelectorNotFound(selector.to_string()))
    }

    async fn current_content(&self) -> scout_browser::Result<PageContent> {
        let current = self
            .current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BrowserError::NavigationError("blank tab".to_string()))?;
        match self.site.action(&format!("reread:{}", current.url)) {
            Some(page) => {
                let page = page?;
                *self.current.lock().unwrap() = Some(page.clone());
                Ok(page)
            }
            None => Ok(current),
        }
    }

    async fn close(&self) -> scout_browser::Result<()> {
        Ok(())
    }
}

pub struct SiteSessions(pub Arc<Site>);

#[async_trait]
impl SessionFactory for SiteSessions {
    async fn open_session(&self) -> scout_browser::Result<Box<dyn BrowserActions>> {
        Ok(Box::new(Tab {
            site: self.0.clone(),
            current: Mutex::new(None),
        }))
    }
}

/// Answers every prompt by keyword, reading markers out of the page HTML.
#[derive(Default)]
pub struct RuleReasoner {
    pub recommended: Option<String>,
    pub not_a_directory: Vec<String>,
    /// Classification prompts time out instead of answering
    pub classification_down: bool,
}

#[async_trait]
impl Reasoner for RuleReasoner {
    async fn reason(&self, prompt: &str, content: &str) -> scout_llm::Result<Judgment> {
        let value = if prompt.contains("blocking mechanisms") {
            if self.classification_down {
                return Err(LlmError::Timeout { seconds: 60 });
            }
            classify(content)
        } else if prompt.contains("Extract financial advisor") {
            extract(content)
        } else if prompt.contains("step-by-step") {
            json!({"strategy": "direct_search", "steps": []})
        } else if prompt.contains("Analyze this page for pagination") {
            json!({"has_pagination": false, "pagination_type": "none", "action_needed": "none"})
        } else if prompt.contains("Check whether this webpage") {
            let rejected = self.not_a_directory.iter().any(|u| prompt.contains(u.as_str()));
            json!({"is_advisor_directory": !rejected, "confidence": "high"})
        } else if prompt.contains("web search results") {
            json!({"recommended_url": self.recommended, "confidence": "high", "alternative_urls": []})
        } else {
            json!({})
        };
        Ok(Judgment::from_value(value).expect("object judgment"))
    }
}

fn classify(content: &str) -> Value {
    let blocking_type = if content.contains("captcha-wall") {
        "captcha"
    } else if content.contains("slow-down-wall") {
        "rate_limit"
    } else if content.contains("denied-wall") {
        "access_denied"
    } else {
        "none"
    };
    json!({
        "blocking_detected": blocking_type != "none",
        "blocking_type": blocking_type,
        "confidence": "high",
        "description": format!("scripted: {blocking_type}")
    })
}

fn extract(content: &str) -> Value {
    let advisors: Vec<Value> = content
        .split("data-name=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(|name| json!({"name": name, "phone": "(212) 555-0100", "state": "NY"}))
        .collect();
    json!({
        "has_advisors": !advisors.is_empty(),
        "advisor_count": advisors.len(),
        "advisors": advisors
    })
}

/// A listing page with advisors and an optional absolute `rel="next"` link.
pub fn listing(names: &[&str], next: Option<&str>) -> String {
    let cards: String = names
        .iter()
        .map(|n| format!("<div class=\"advisor\" data-name=\"{n}\">{n} (212) 555-0100</div>"))
        .collect();
    let next = next
        .map(|url| format!("<a rel=\"next\" href=\"{url}\">Next</a>"))
        .unwrap_or_default();
    format!("<html><body><h1>Find a Financial Advisor</h1>{cards}{next}</body></html>")
}

pub fn captcha_page() -> String {
    "<html><body><div class=\"g-recaptcha\">captcha-wall</div></body></html>".to_string()
}

pub fn rate_limited_page() -> String {
    "<html><body><p>slow-down-wall</p></body></html>".to_string()
}

pub fn empty_listing() -> String {
    "<html><body><h1>Find a Financial Advisor</h1><p>No results</p></body></html>".to_string()
}

/// Search stub; the last reply repeats.
pub struct CountingSearch {
    replies: Mutex<VecDeque<Vec<String>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingSearch {
    pub fn new(replies: Vec<Vec<&str>>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    pub fn with_delay(replies: Vec<Vec<&str>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for CountingSearch {
    async fn search(&self, _query: &str) -> Result<Vec<String>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        Ok(reply.unwrap_or_default())
    }
}

/// Accepts every candidate except the listed ones.
#[derive(Default)]
pub struct StubVerifier {
    pub rejected: Vec<String>,
    pub checked: Mutex<Vec<String>>,
}

impl StubVerifier {
    pub fn rejecting(urls: &[&str]) -> Self {
        Self {
            rejected: urls.iter().map(|u| (*u).to_string()).collect(),
            checked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CandidateVerifier for StubVerifier {
    async fn verify(&self, _key: &WorkItemKey, url: &str) -> bool {
        self.checked.lock().unwrap().push(url.to_string());
        !self.rejected.iter().any(|r| r == url)
    }
}

pub fn settings() -> ScrapeSettings {
    ScrapeSettings {
        captcha_wait: Duration::from_secs(30),
        captcha_max_retries: 2,
        rate_limit_wait: Duration::from_secs(60),
        access_denied_wait: Duration::from_secs(120),
        access_denied_max_retries: 2,
        js_challenge_wait: Duration::from_secs(15),
        max_attempts: 10,
        max_pages_per_state: 10,
        max_empty_pages: 3,
        max_advisors_per_item: 1000,
        max_rediscoveries: 2,
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        concurrent_items: 1,
        headless: true,
    }
}

/// Wired-up controller over scripted collaborators.
pub struct Harness {
    pub site: Arc<Site>,
    pub search: Arc<CountingSearch>,
    pub store: Arc<MemoryStore>,
    pub resolver: Arc<UrlResolver>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl Harness {
    pub fn new(site: Arc<Site>, search: Arc<CountingSearch>, settings: ScrapeSettings) -> Self {
        Self::with_reasoner(site, search, settings, RuleReasoner::default())
    }

    pub fn with_reasoner(
        site: Arc<Site>,
        search: Arc<CountingSearch>,
        settings: ScrapeSettings,
        reasoner: RuleReasoner,
    ) -> Self {
        let reasoner: Arc<dyn Reasoner> = Arc::new(reasoner);
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(UrlResolver::new(
            store.clone(),
            search.clone(),
            reasoner.clone(),
            Arc::new(StubVerifier::default()),
        ));
        let classifier = Arc::new(PageClassifier::new(reasoner.clone()));
        let orchestrator = Arc::new(SessionOrchestrator::new(
            resolver.clone(),
            classifier,
            reasoner,
            settings,
        ));
        Self {
            site,
            search,
            store,
            resolver,
            orchestrator,
        }
    }

    pub fn tab(&self) -> Tab {
        Tab {
            site: self.site.clone(),
            current: Mutex::new(None),
        }
    }
}
