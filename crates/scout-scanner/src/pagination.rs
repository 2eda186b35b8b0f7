//! Pagination detection for directory listings.
//!
//! Recognized idioms, in order: an unchanged page (end of results), a
//! `rel="next"` link, a "next"/"load more" control, a numbered page
//! sequence. The reasoner is asked only when none of these match. The page
//! limit is enforced regardless of what the page claims.

use once_cell::sync::Lazy;
use scout_browser::PageContent;
use scout_llm::Reasoner;
use scraper::{ElementRef, Html, Selector};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

static REL_NEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[rel~='next'], link[rel~='next']").expect("valid selector"));
static CONTROLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a, button").expect("valid selector"));
static PAGER_ITEMS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "[class*='pagination'] a, [class*='pagination'] button, [class*='pagination'] span, \
         [class*='pager'] a, [class*='pager'] button, [class*='pager'] span, \
         nav a, nav button",
    )
    .expect("valid selector")
});
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));

const NEXT_LABELS: &[&str] = &[
    "next",
    "next page",
    "next »",
    "next ›",
    "next >",
    "›",
    "»",
    "load more",
    "show more",
    "show more results",
    "more results",
    "view more",
];

const PAGINATION_PROMPT: &str = r#"Analyze this page for pagination or "load more" functionality:
"Next" buttons or links, "Load More" buttons, page numbers, "Show more results" options.

Respond with JSON:
{
    "has_pagination": boolean,
    "pagination_type": "next_button|load_more|page_numbers|infinite_scroll|none",
    "action_needed": "click|scroll|none",
    "selector": "css selector of the control to click",
    "confidence": "high|medium|low"
}"#;

/// How to reach the next listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationInstruction {
    /// Load this URL
    FollowLink(String),
    /// Click this element on the current page
    Click(String),
}

/// Result of inspecting a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationOutcome {
    /// Another page exists and is within the limit
    Next(NavigationInstruction),
    /// Another page exists but the page limit has been reached
    LimitReached,
    /// The listing has ended
    End,
}

/// Stateful pagination driver for one work item.
pub struct PaginationDriver {
    max_pages: u32,
    reasoner: Option<Arc<dyn Reasoner>>,
    last_fingerprint: Option<u64>,
    pending: Option<NavigationInstruction>,
}

impl PaginationDriver {
    /// Create a driver bounded by `max_pages` listing pages.
    #[must_use]
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages,
            reasoner: None,
            last_fingerprint: None,
            pending: None,
        }
    }

    /// Ask the reasoner when no heuristic matches.
    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Forget the previous page, e.g. after the entry URL changed.
    pub fn reset(&mut self) {
        self.last_fingerprint = None;
        self.pending = None;
    }

    /// Inspect the usable page at `current_page_index` (0-based).
    pub async fn inspect(&mut self, page: &PageContent, current_page_index: u32) -> PaginationOutcome {
        self.pending = None;

        let fingerprint = content_fingerprint(&page.html);
        if self.last_fingerprint.replace(fingerprint) == Some(fingerprint) {
            tracing::info!(page = current_page_index + 1, "Page content unchanged; end of results");
            return PaginationOutcome::End;
        }

        let Some(instruction) = self.detect(page, current_page_index).await else {
            return PaginationOutcome::End;
        };

        if current_page_index.saturating_add(1) >= self.max_pages {
            tracing::info!(max_pages = self.max_pages, "Page limit reached with more pages available");
            return PaginationOutcome::LimitReached;
        }

        self.pending = Some(instruction.clone());
        PaginationOutcome::Next(instruction)
    }

    /// Whether `page` shows the same content as the last inspected page.
    ///
    /// Re-reading the tab after a block can return the page the next-page
    /// control was clicked on, before the new results rendered.
    #[must_use]
    pub fn is_repeat(&self, page: &PageContent) -> bool {
        self.last_fingerprint == Some(content_fingerprint(&page.html))
    }

    /// Whether a next page exists within the limit.
    pub async fn has_next(&mut self, page: &PageContent, current_page_index: u32) -> bool {
        matches!(
            self.inspect(page, current_page_index).await,
            PaginationOutcome::Next(_)
        )
    }

    /// Instruction found by the last successful [`has_next`](Self::has_next).
    pub fn advance(&mut self) -> Option<NavigationInstruction> {
        self.pending.take()
    }

    async fn detect(&self, page: &PageContent, current_page_index: u32) -> Option<NavigationInstruction> {
        if let Some(instruction) = detect_links(&page.html, &page.url, current_page_index) {
            return Some(instruction);
        }
        let reasoner = self.reasoner.as_ref()?;

        let prompt = format!("{PAGINATION_PROMPT}\n\nURL: {}", page.url);
        match reasoner.reason(&prompt, &page.html).await {
            Ok(judgment) => {
                let has_pagination = judgment.bool_field("has_pagination").unwrap_or(false);
                let clicks = judgment.str_field("action_needed") == Some("click");
                match judgment.str_field("selector") {
                    Some(selector) if has_pagination && clicks => {
                        tracing::debug!(selector, "Reasoner found a pagination control");
                        Some(NavigationInstruction::Click(selector.to_string()))
                    }
                    _ => None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pagination reasoning failed; treating as last page");
                None
            }
        }
    }
}

/// Heuristic next-page detection on raw HTML.
#[must_use]
pub fn detect_links(html: &str, base_url: &str, current_page_index: u32) -> Option<NavigationInstruction> {
    let document = Html::parse_document(html);

    if let Some(href) = document
        .select(&REL_NEXT)
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| absolute_link(base_url, href))
    {
        return Some(NavigationInstruction::FollowLink(href));
    }

    for control in document.select(&CONTROLS) {
        if is_disabled(&control) {
            continue;
        }
        let text = normalized_text(&control);
        let aria = control
            .value()
            .attr("aria-label")
            .map(str::to_lowercase)
            .unwrap_or_default();
        if NEXT_LABELS.contains(&text.as_str()) || aria.contains("next page") || aria == "next" {
            if let Some(instruction) = instruction_for(&control, base_url) {
                return Some(instruction);
            }
        }
    }

    page_number_link(&document, base_url, current_page_index)
}

fn page_number_link(document: &Html, base_url: &str, current_page_index: u32) -> Option<NavigationInstruction> {
    let numbered: Vec<(u32, ElementRef<'_>)> = document
        .select(&PAGER_ITEMS)
        .filter_map(|el| normalized_text(&el).parse::<u32>().ok().map(|n| (n, el)))
        .collect();
    let highest = numbered.iter().map(|(n, _)| *n).max()?;

    let current = numbered
        .iter()
        .find(|(_, el)| is_current(el))
        .map_or(current_page_index + 1, |(n, _)| *n);
    if current >= highest {
        return None;
    }

    numbered
        .iter()
        .filter(|(n, el)| *n == current + 1 && !is_disabled(el))
        .find_map(|(_, el)| instruction_for(el, base_url))
}

fn instruction_for(element: &ElementRef<'_>, base_url: &str) -> Option<NavigationInstruction> {
    if let Some(link) = element
        .value()
        .attr("href")
        .and_then(|href| absolute_link(base_url, href))
    {
        return Some(NavigationInstruction::FollowLink(link));
    }
    css_path(element).map(NavigationInstruction::Click)
}

/// A selector specific enough to click the element again in the browser.
fn css_path(element: &ElementRef<'_>) -> Option<String> {
    let el = element.value();
    if let Some(id) = el.id().filter(|id| is_plain_ident(id)) {
        return Some(format!("#{id}"));
    }
    if let Some(label) = el.attr("aria-label") {
        return Some(format!(
            "{}[aria-label=\"{}\"]",
            el.name(),
            label.replace('"', "\\\"")
        ));
    }
    let classes: Vec<&str> = el.classes().filter(|c| is_plain_ident(c)).collect();
    if classes.is_empty() {
        None
    } else {
        Some(format!("{}.{}", el.name(), classes.join(".")))
    }
}

fn is_plain_ident(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with(|c: char| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn absolute_link(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_lowercase().starts_with("javascript:") {
        return None;
    }
    let base = url::Url::parse(base_url).ok()?;
    let joined = base.join(href).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

fn normalized_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_disabled(element: &ElementRef<'_>) -> bool {
    let el = element.value();
    el.attr("disabled").is_some()
        || el.attr("aria-disabled") == Some("true")
        || el.classes().any(|c| c.eq_ignore_ascii_case("disabled"))
}

fn is_current(element: &ElementRef<'_>) -> bool {
    let el = element.value();
    el.attr("aria-current").is_some()
        || el
            .classes()
            .any(|c| matches!(c.to_lowercase().as_str(), "active" | "current" | "selected"))
}

/// Hash of the page's visible body text with whitespace collapsed.
fn content_fingerprint(html: &str) -> u64 {
    let document = Html::parse_document(html);
    let mut hasher = DefaultHasher::new();
    match document.select(&BODY).next() {
        Some(body) => {
            for word in body.text().flat_map(str::split_whitespace) {
                word.hash(&mut hasher);
            }
        }
        None => html.hash(&mut hasher),
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://advisor.example.com/search?state=OH";

    fn page(html: &str) -> PageContent {
        PageContent::new(BASE, html)
    }

    #[test]
    fn test_rel_next_link_resolved_against_base() {
        let html = r#"<html><head><link rel="next" href="/search?state=OH&page=2"></head><body>x</body></html>"#;
        assert_eq!(
            detect_links(html, BASE, 0),
            Some(NavigationInstruction::FollowLink(
                "https://advisor.example.com/search?state=OH&page=2".into()
            ))
        );
    }

    #[test]
    fn test_next_button_without_href_is_clicked() {
        let html = r#"<body><button class="load-more">Load more</button></body>"#;
        assert_eq!(
            detect_links(html, BASE, 0),
            Some(NavigationInstruction::Click("button.load-more".into()))
        );

        let html = r#"<body><a id="nextPage" href="javascript:void(0)">Next</a></body>"#;
        assert_eq!(
            detect_links(html, BASE, 0),
            Some(NavigationInstruction::Click("#nextPage".into()))
        );
    }

    #[test]
    fn test_disabled_next_is_ignored() {
        let html = r#"<body><a class="next disabled" aria-disabled="true" href="/p/9">Next</a></body>"#;
        assert_eq!(detect_links(html, BASE, 0), None);
    }

    #[test]
    fn test_page_number_sequence() {
        let html = r#"<body><ul class="pagination">
            <li><a href="/p/1">1</a></li>
            <li><a class="active" href="/p/2">2</a></li>
            <li><a href="/p/3">3</a></li>
        </ul></body>"#;
        assert_eq!(
            detect_links(html, BASE, 0),
            Some(NavigationInstruction::FollowLink(
                "https://advisor.example.com/p/3".into()
            ))
        );

        let last = r#"<body><ul class="pagination">
            <li><a href="/p/1">1</a></li>
            <li><a class="active" href="/p/2">2</a></li>
        </ul></body>"#;
        assert_eq!(detect_links(last, BASE, 1), None);
    }

    #[tokio::test]
    async fn test_unchanged_content_ends_listing() {
        let html = r#"<body><p>Jane Doe</p><a rel="next" href="/p/2">Next</a></body>"#;
        let mut driver = PaginationDriver::new(50);

        assert!(driver.has_next(&page(html), 0).await);
        assert_eq!(
            driver.advance(),
            Some(NavigationInstruction::FollowLink(
                "https://advisor.example.com/p/2".into()
            ))
        );
        assert_eq!(driver.advance(), None);

        assert_eq!(driver.inspect(&page(html), 1).await, PaginationOutcome::End);
    }

    #[tokio::test]
    async fn test_repeat_detection_ignores_layout_whitespace() {
        let mut driver = PaginationDriver::new(10);
        let first = r#"<body><p>Jane Doe</p><button id="more">Load more</button></body>"#;
        assert!(!driver.is_repeat(&page(first)));

        assert!(driver.has_next(&page(first), 0).await);
        assert_eq!(driver.advance(), Some(NavigationInstruction::Click("#more".into())));

        let reflowed = "<body>\n  <p>Jane   Doe</p>\n  <button id=\"more\">Load more</button>\n</body>";
        assert!(driver.is_repeat(&page(reflowed)));
        assert!(!driver.is_repeat(&page(r#"<body><p>John Roe</p></body>"#)));

        driver.reset();
        assert!(!driver.is_repeat(&page(first)));
    }

    #[tokio::test]
    async fn test_limit_enforced_even_when_page_claims_more() {
        let mut driver = PaginationDriver::new(2);
        let first = r#"<body><p>one</p><a rel="next" href="/p/2">Next</a></body>"#;
        let second = r#"<body><p>two</p><a rel="next" href="/p/3">Next</a></body>"#;

        assert!(matches!(
            driver.inspect(&page(first), 0).await,
            PaginationOutcome::Next(_)
        ));
        assert_eq!(
            driver.inspect(&page(second), 1).await,
            PaginationOutcome::LimitReached
        );
        assert_eq!(driver.advance(), None);
    }

    #[tokio::test]
    async fn test_no_controls_ends_listing() {
        let mut driver = PaginationDriver::new(10);
        assert_eq!(
            driver.inspect(&page("<body><p>only page</p></body>"), 0).await,
            PaginationOutcome::End
        );
    }
}
