use crate::actions::{BrowserActions, SessionFactory};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use crate::session::BrowserSession;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use futures::StreamExt;
use scout_core::BrowserConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Minimum spacing between navigations to one domain
#[derive(Debug)]
pub(crate) struct RateLimiter {
    next_allowed: HashMap<String, Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            next_allowed: HashMap::new(),
            min_interval,
        }
    }

    /// Claim the next navigation slot for a domain and return how long to wait for it.
    fn reserve(&mut self, domain: &str) -> Duration {
        let now = Instant::now();
        let slot = match self.next_allowed.get(domain) {
            Some(&next) if next > now => next,
            _ => now,
        };
        self.next_allowed
            .insert(domain.to_string(), slot + self.min_interval);
        slot.saturating_duration_since(now)
    }
}

/// Sleep until the limiter grants a slot for `domain`. The lock is not held while sleeping.
pub(crate) async fn wait_turn(limiter: &Mutex<RateLimiter>, domain: &str) {
    let delay = limiter.lock().await.reserve(domain);
    if !delay.is_zero() {
        tracing::debug!(domain, delay_ms = delay.as_millis() as u64, "Pacing navigation");
        tokio::time::sleep(delay).await;
    }
}

/// Browser automation engine
pub struct BrowserEngine {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    fingerprint: FingerprintConfig,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    navigation_timeout: Duration,
}

impl BrowserEngine {
    /// Launch Chromium with the configured window and visibility.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let fingerprint = FingerprintConfig::for_window(config.window_width, config.window_height);
        let navigation_timeout = Duration::from_secs(config.navigation_timeout_secs);

        let mut builder = CdpBrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .request_timeout(navigation_timeout)
            .arg("--disable-blink-features=AutomationControlled");
        if !config.headless {
            builder = builder.with_head();
        }
        let cdp_config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
            flag.store(false, Ordering::SeqCst);
            tracing::warn!("Browser handler exited");
        });

        tracing::info!(
            headless = config.headless,
            width = fingerprint.viewport_width,
            height = fingerprint.viewport_height,
            "Browser launched"
        );

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            alive,
            fingerprint,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(Duration::from_secs(1)))),
            navigation_timeout,
        })
    }

    /// Override the per-domain navigation spacing.
    #[must_use]
    pub fn with_min_domain_interval(mut self, interval: Duration) -> Self {
        self.rate_limiter = Arc::new(Mutex::new(RateLimiter::new(interval)));
        self
    }

    /// Whether the browser process is still connected.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Close the browser and stop the event handler.
    pub async fn shutdown(&self) {
        if let Err(e) = self.browser.lock().await.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        self.handler.abort();
    }
}

#[async_trait::async_trait]
impl SessionFactory for BrowserEngine {
    async fn open_session(&self) -> Result<Box<dyn BrowserActions>> {
        if !self.is_alive() {
            return Err(BrowserError::SessionClosed);
        }

        let page = self.browser.lock().await.new_page("about:blank").await?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.fingerprint.user_agent.clone())
            .accept_language(self.fingerprint.accept_language.clone())
            .build()
            .map_err(BrowserError::ChromiumError)?;
        page.execute(user_agent).await?;

        Ok(Box::new(BrowserSession::new(
            page,
            Arc::clone(&self.rate_limiter),
            Arc::clone(&self.alive),
            self.navigation_timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_same_domain() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));

        assert_eq!(limiter.reserve("www.ubs.com"), Duration::ZERO);
        assert_eq!(limiter.reserve("www.ubs.com"), Duration::from_millis(100));
        // A third caller queues behind the second
        assert_eq!(limiter.reserve("www.ubs.com"), Duration::from_millis(200));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.reserve("www.ubs.com"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_different_domains() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));

        assert_eq!(limiter.reserve("www.ubs.com"), Duration::ZERO);
        assert_eq!(limiter.reserve("advisor.ml.com"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_turn_sleeps() {
        let limiter = Mutex::new(RateLimiter::new(Duration::from_secs(2)));
        let start = Instant::now();

        wait_turn(&limiter, "advisor.morganstanley.com").await;
        wait_turn(&limiter, "advisor.morganstanley.com").await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
