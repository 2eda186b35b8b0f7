use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};

/// Snapshot of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    /// Final URL after redirects
    pub url: String,
    /// Document title
    pub title: Option<String>,
    /// Rendered HTML
    pub html: String,
    /// HTTP status of the main document, when known
    pub status: Option<u16>,
}

impl PageContent {
    /// Build a snapshot from a URL and its HTML.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            html: html.into(),
            status: None,
        }
    }

    /// Attach a title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach an HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Browser actions for one tab.
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Load a URL and return the rendered page
    async fn navigate(&self, url: &str) -> Result<PageContent>;

    /// Replace the value of a form field
    async fn fill_field(&self, selector: &str, value: &str) -> Result<()>;

    /// Click an element
    async fn click(&self, selector: &str) -> Result<()>;

    /// Press Enter inside an element (submits most search forms)
    async fn submit(&self, selector: &str) -> Result<()>;

    /// Choose an option of a `<select>` by value or visible text
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// Snapshot the page as it currently is, without navigating
    async fn current_content(&self) -> Result<PageContent>;

    /// Close the tab
    async fn close(&self) -> Result<()>;
}

/// Opens an isolated tab per work item.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a new session
    async fn open_session(&self) -> Result<Box<dyn BrowserActions>>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("invalid URL {url}: {e}")))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("no host in URL".to_string()))
        .map(str::to_lowercase)
}
