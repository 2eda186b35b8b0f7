use crate::actions::{extract_domain, BrowserActions, PageContent};
use crate::engine::{wait_turn, RateLimiter};
use crate::error::{BrowserError, Result};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{FrameId, NavigateParams};
use chromiumoxide::element::Element;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const WAIT_FOR_READY_SCRIPT: &str = r"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
";

/// Delay after an interaction so scripts can re-render the listing.
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// One browser tab driven by a single work item.
pub struct BrowserSession {
    page: Page,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    alive: Arc<AtomicBool>,
    navigation_timeout: Duration,
}

impl BrowserSession {
    pub(crate) fn new(
        page: Page,
        rate_limiter: Arc<Mutex<RateLimiter>>,
        alive: Arc<AtomicBool>,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            page,
            rate_limiter,
            alive,
            navigation_timeout,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrowserError::SessionClosed)
        }
    }

    async fn wait_for_ready(&self) {
        match tokio::time::timeout(
            self.navigation_timeout,
            self.page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                tracing::trace!("Page ready state: {}", state);
            }
            Ok(Err(e)) => tracing::debug!("Could not check ready state: {}", e),
            Err(_) => tracing::warn!("Timeout waiting for page ready state"),
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(SETTLE_DELAY).await;
        self.wait_for_ready().await;
    }

    async fn snapshot(&self, fallback_url: &str) -> Result<PageContent> {
        let url = self
            .page
            .url()
            .await?
            .map_or_else(|| fallback_url.to_string(), |u| u.to_string());
        let title = self.page.get_title().await.ok().flatten();
        let html = self.page.content().await?;

        Ok(PageContent {
            url,
            title,
            html,
            status: None,
        })
    }

    async fn element(&self, selector: &str) -> Result<Element> {
        self.ensure_alive()?;
        self.page.find_element(selector).await.map_err(|e| {
            let err = BrowserError::from(e);
            if err.is_fatal() {
                err
            } else {
                BrowserError::SelectorNotFound(selector.to_string())
            }
        })
    }

    async fn eval_bool(&self, script: String) -> Result<bool> {
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<bool>()
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }
}

/// Status of the last document response delivered for `frame`.
///
/// Only already-delivered events are read; redirects report the final hop.
fn drain_document_status(
    responses: &mut EventStream<EventResponseReceived>,
    frame: &FrameId,
) -> Option<u16> {
    let mut status = None;
    while let Some(Some(event)) = responses.next().now_or_never() {
        if event.r#type == ResourceType::Document && event.frame_id.as_ref() == Some(frame) {
            status = http_status(event.response.status);
        }
    }
    status
}

fn http_status(code: i64) -> Option<u16> {
    u16::try_from(code).ok().filter(|c| (100..=599).contains(c))
}

fn js_string(value: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| BrowserError::ChromiumError(e.to_string()))
}

#[async_trait::async_trait]
impl BrowserActions for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<PageContent> {
        self.ensure_alive()?;
        let domain = extract_domain(url)?;
        wait_turn(&self.rate_limiter, &domain).await;

        tracing::debug!("Navigating to {}", url);
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::NavigationError)?;
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;

        let frame = match tokio::time::timeout(self.navigation_timeout, self.page.execute(params)).await {
            Err(_) => {
                return Err(BrowserError::Timeout(format!(
                    "navigation to {url} exceeded {}s",
                    self.navigation_timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                let err = BrowserError::from(e);
                return Err(if err.is_fatal() {
                    err
                } else {
                    BrowserError::NavigationError(format!("{url}: {err}"))
                });
            }
            Ok(Ok(response)) => {
                if let Some(error_text) = response.result.error_text.clone() {
                    return Err(BrowserError::NavigationError(format!("{url}: {error_text}")));
                }
                response.result.frame_id.clone()
            }
        };

        self.wait_for_ready().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let status = drain_document_status(&mut responses, &frame);
        if let Some(code) = status.filter(|c| *c >= 400) {
            tracing::debug!(status = code, "Error status for {}", url);
        }
        let mut page = self.snapshot(url).await?;
        page.status = status;
        Ok(page)
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.element(selector).await?;
        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.value = ''; }} return !!el; }})()",
            js_string(selector)?
        );
        self.eval_bool(clear).await?;
        element.click().await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.element(selector).await?;
        element.click().await?;
        self.settle().await;
        Ok(())
    }

    async fn submit(&self, selector: &str) -> Result<()> {
        let element = self.element(selector).await?;
        element.press_key("Enter").await?;
        self.settle().await;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.ensure_alive()?;
        let script = format!(
            "(() => {{
                const el = document.querySelector({sel});
                if (!el || !el.options) return false;
                const want = {val}.trim().toLowerCase();
                const opt = Array.from(el.options).find(o =>
                    o.value.toLowerCase() === want || o.text.trim().toLowerCase() === want);
                if (!opt) return false;
                el.value = opt.value;
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()",
            sel = js_string(selector)?,
            val = js_string(value)?
        );
        if self.eval_bool(script).await? {
            Ok(())
        } else {
            Err(BrowserError::SelectorNotFound(format!(
                "{selector} (option {value})"
            )))
        }
    }

    async fn current_content(&self) -> Result<PageContent> {
        self.ensure_alive()?;
        self.snapshot("").await
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_range() {
        assert_eq!(http_status(404), Some(404));
        assert_eq!(http_status(200), Some(200));
        assert_eq!(http_status(0), None);
        assert_eq!(http_status(-1), None);
        assert_eq!(http_status(70_000), None);
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        let quoted = js_string(r#"input[placeholder*="location" i]"#).expect("quote");
        assert_eq!(quoted, r#""input[placeholder*=\"location\" i]""#);
    }
}
