//! Page classification: usable listing or some form of blocking.
//!
//! HTTP status codes short-circuit the decision. Everything else goes to the
//! reasoner; when the reasoner fails, keyword heuristics decide between the
//! two safe defaults (`Usable` with confidence 0 when the page visibly lists
//! advisors and shows no block signal, `AccessDenied` with confidence 0
//! otherwise).

use once_cell::sync::Lazy;
use regex::Regex;
use scout_browser::{BrowserError, PageContent};
use scout_llm::{Judgment, Reasoner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(?\b\d{3}\)?[\s.\-]\d{3}[\s.\-]\d{4}\b").expect("valid phone regex")
});

const CAPTCHA_SIGNALS: &[&str] = &[
    "g-recaptcha",
    "recaptcha",
    "hcaptcha",
    "captcha",
    "verify you are human",
    "are you a robot",
];
const JS_CHALLENGE_SIGNALS: &[&str] = &[
    "checking your browser",
    "cf-browser-verification",
    "cf-challenge",
    "just a moment...",
    "please enable javascript and cookies",
];
const RATE_LIMIT_SIGNALS: &[&str] = &["too many requests", "rate limit", "slow down"];
const ACCESS_DENIED_SIGNALS: &[&str] = &[
    "access denied",
    "403 forbidden",
    "request blocked",
    "you have been blocked",
    "automated access",
];
const CONTENT_MARKERS: &[&str] = &["financial advisor", "wealth advisor", "advisor"];

const CLASSIFY_PROMPT: &str = r#"Analyze this webpage to detect blocking mechanisms, CAPTCHAs or anti-bot measures.

Look for CAPTCHA challenges (reCAPTCHA, hCaptcha, custom), rate limiting messages,
"access denied" or "blocked" messages, Cloudflare or other "checking your browser"
interstitials, and pages saying the requested page no longer exists.

Respond with JSON:
{
    "blocking_detected": boolean,
    "blocking_type": "captcha|rate_limit|access_denied|cloudflare|javascript_challenge|not_found|none",
    "confidence": "high|medium|low",
    "description": "what was detected"
}"#;

/// Classification taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// Directory content is accessible
    Usable,
    /// A CAPTCHA must be solved
    CaptchaChallenge,
    /// The site asks to slow down
    RateLimited,
    /// The request was refused
    AccessDenied,
    /// A JavaScript interstitial is running
    JsChallenge,
    /// The entry point is gone
    NotFound,
}

impl VerdictKind {
    /// Whether this verdict counts as a blocking encounter.
    #[must_use]
    pub fn is_block(self) -> bool {
        matches!(
            self,
            Self::CaptchaChallenge | Self::RateLimited | Self::AccessDenied | Self::JsChallenge
        )
    }

    /// Short name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Usable => "usable",
            Self::CaptchaChallenge => "captcha",
            Self::RateLimited => "rate_limited",
            Self::AccessDenied => "access_denied",
            Self::JsChallenge => "js_challenge",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judgment about one fetched page. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PageVerdict {
    /// Classification
    pub kind: VerdictKind,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Why the classifier decided this
    pub rationale: String,
}

impl PageVerdict {
    /// Create a verdict, clamping the confidence into `[0, 1]`.
    #[must_use]
    pub fn new(kind: VerdictKind, confidence: f64, rationale: impl Into<String>) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            kind,
            confidence,
            rationale: rationale.into(),
        }
    }

    /// Whether the page can be extracted.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.kind == VerdictKind::Usable
    }

    /// Safe-default verdict for a fetch that failed without a page.
    #[must_use]
    pub fn unreachable(error: &BrowserError) -> Self {
        Self::new(
            VerdictKind::AccessDenied,
            0.0,
            format!("page could not be fetched: {error}"),
        )
    }
}

/// Keyword evidence found in a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    /// Strongest block indication, if any
    pub block: Option<VerdictKind>,
    /// Whether the page looks like a listing of advisors
    pub content: bool,
}

/// Scan page text for block signals and advisor listing markers.
#[must_use]
pub fn heuristic_signals(page: &PageContent) -> Signals {
    let text = page.html.to_lowercase();
    let title = page.title.as_deref().unwrap_or_default().to_lowercase();
    let contains_any = |needles: &[&str]| {
        needles
            .iter()
            .any(|n| text.contains(n) || title.contains(n))
    };

    let block = if contains_any(JS_CHALLENGE_SIGNALS) {
        Some(VerdictKind::JsChallenge)
    } else if contains_any(CAPTCHA_SIGNALS) {
        Some(VerdictKind::CaptchaChallenge)
    } else if contains_any(RATE_LIMIT_SIGNALS) {
        Some(VerdictKind::RateLimited)
    } else if contains_any(ACCESS_DENIED_SIGNALS) {
        Some(VerdictKind::AccessDenied)
    } else {
        None
    };

    let content = contains_any(CONTENT_MARKERS) && PHONE_PATTERN.is_match(&page.html);

    Signals { block, content }
}

/// Verdict implied by the HTTP status alone.
#[must_use]
pub fn status_verdict(status: Option<u16>) -> Option<PageVerdict> {
    let verdict = match status? {
        404 | 410 => PageVerdict::new(VerdictKind::NotFound, 1.0, "HTTP status reports a missing page"),
        429 => PageVerdict::new(VerdictKind::RateLimited, 1.0, "HTTP 429 Too Many Requests"),
        401 | 403 => PageVerdict::new(VerdictKind::AccessDenied, 0.9, "HTTP status refuses access"),
        500..=599 => PageVerdict::new(
            VerdictKind::RateLimited,
            0.6,
            "HTTP server error; backing off before retrying",
        ),
        _ => return None,
    };
    Some(verdict)
}

/// Map a reasoner judgment onto a verdict; `None` when the judgment is unreadable.
#[must_use]
pub fn verdict_from_judgment(judgment: &Judgment) -> Option<PageVerdict> {
    let blocked = judgment.bool_field("blocking_detected")?;
    let confidence = confidence_value(judgment);
    let rationale = judgment
        .str_field("description")
        .unwrap_or("no description")
        .to_string();

    if !blocked {
        return Some(PageVerdict::new(VerdictKind::Usable, confidence, rationale));
    }

    let kind = match judgment
        .str_field("blocking_type")
        .unwrap_or("unknown")
        .to_lowercase()
        .as_str()
    {
        "captcha" => VerdictKind::CaptchaChallenge,
        "rate_limit" | "rate_limited" => VerdictKind::RateLimited,
        "cloudflare" | "javascript_challenge" | "js_challenge" => VerdictKind::JsChallenge,
        "not_found" => VerdictKind::NotFound,
        _ => VerdictKind::AccessDenied,
    };
    Some(PageVerdict::new(kind, confidence, rationale))
}

/// Confidence as a number; accepts `high|medium|low` or a numeric value.
pub(crate) fn confidence_value(judgment: &Judgment) -> f64 {
    if let Some(value) = judgment.f64_field("confidence") {
        return value;
    }
    match judgment.str_field("confidence").map(str::to_lowercase).as_deref() {
        Some("high") => 0.9,
        Some("medium") => 0.6,
        Some("low") => 0.3,
        _ => 0.5,
    }
}

/// Classifies fetched pages.
pub struct PageClassifier {
    reasoner: Arc<dyn Reasoner>,
}

impl PageClassifier {
    /// Create a classifier backed by a reasoner.
    #[must_use]
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Classify a page. Never fails: reasoner errors degrade to a safe default.
    pub async fn classify(&self, page: &PageContent) -> PageVerdict {
        if let Some(verdict) = status_verdict(page.status) {
            return verdict;
        }

        let prompt = format!(
            "{CLASSIFY_PROMPT}\n\nURL: {}\nPage title: {}",
            page.url,
            page.title.as_deref().unwrap_or("")
        );

        match self.reasoner.reason(&prompt, &page.html).await {
            Ok(judgment) => match verdict_from_judgment(&judgment) {
                Some(verdict) => verdict,
                None => {
                    tracing::warn!(url = %page.url, "Classification judgment missing blocking_detected");
                    Self::fallback(page, "unreadable classification judgment")
                }
            },
            Err(e) => {
                tracing::warn!(url = %page.url, error = %e, "Classification reasoning failed");
                Self::fallback(page, &e.to_string())
            }
        }
    }

    fn fallback(page: &PageContent, cause: &str) -> PageVerdict {
        let signals = heuristic_signals(page);
        if signals.content && signals.block.is_none() {
            PageVerdict::new(
                VerdictKind::Usable,
                0.0,
                format!("reasoner unavailable ({cause}); listing markers present"),
            )
        } else {
            PageVerdict::new(
                VerdictKind::AccessDenied,
                0.0,
                format!("reasoner unavailable ({cause}); page not corroborated as usable"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scout_llm::LlmError;
    use serde_json::json;

    struct FixedReasoner(Option<serde_json::Value>);

    #[async_trait]
    impl Reasoner for FixedReasoner {
        async fn reason(&self, _prompt: &str, _content: &str) -> scout_llm::Result<Judgment> {
            match &self.0 {
                Some(value) => Judgment::from_value(value.clone())
                    .ok_or_else(|| LlmError::MalformedJudgment("not an object".into())),
                None => Err(LlmError::Timeout { seconds: 60 }),
            }
        }
    }

    fn classifier(value: Option<serde_json::Value>) -> PageClassifier {
        PageClassifier::new(Arc::new(FixedReasoner(value)))
    }

    const LISTING: &str = "<html><body><h1>Find a Financial Advisor</h1>\
        <div class='advisor'>Jane Doe (212) 555-0100</div></body></html>";

    #[tokio::test]
    async fn test_status_short_circuits_reasoner() {
        let page = PageContent::new("https://x.example", LISTING).with_status(404);
        let verdict = classifier(None).classify(&page).await;
        assert_eq!(verdict.kind, VerdictKind::NotFound);

        let page = PageContent::new("https://x.example", LISTING).with_status(429);
        assert_eq!(
            classifier(None).classify(&page).await.kind,
            VerdictKind::RateLimited
        );
    }

    #[test]
    fn test_server_errors_back_off() {
        for status in [500, 502, 503, 504] {
            let verdict = status_verdict(Some(status)).expect("server error verdict");
            assert_eq!(verdict.kind, VerdictKind::RateLimited, "status {status}");
        }
        assert!(status_verdict(Some(200)).is_none());
        assert!(status_verdict(Some(302)).is_none());
        assert!(status_verdict(None).is_none());
    }

    #[tokio::test]
    async fn test_judgment_mapping() {
        let page = PageContent::new("https://x.example", "<html></html>");
        let verdict = classifier(Some(json!({
            "blocking_detected": true,
            "blocking_type": "cloudflare",
            "confidence": "high",
            "description": "Checking your browser"
        })))
        .classify(&page)
        .await;

        assert_eq!(verdict.kind, VerdictKind::JsChallenge);
        assert!((verdict.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(verdict.rationale, "Checking your browser");
    }

    #[tokio::test]
    async fn test_unknown_blocking_type_is_access_denied() {
        let page = PageContent::new("https://x.example", "<html></html>");
        let verdict = classifier(Some(json!({
            "blocking_detected": "true",
            "blocking_type": "unknown",
            "confidence": 0.7
        })))
        .classify(&page)
        .await;
        assert_eq!(verdict.kind, VerdictKind::AccessDenied);
        assert!((verdict.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_usable_when_corroborated() {
        let page = PageContent::new("https://x.example", LISTING);
        let verdict = classifier(None).classify(&page).await;
        assert_eq!(verdict.kind, VerdictKind::Usable);
        assert!(verdict.confidence.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_access_denied() {
        let blocked = format!("{LISTING}<div class='g-recaptcha'></div>");
        let verdict = classifier(None)
            .classify(&PageContent::new("https://x.example", blocked))
            .await;
        assert_eq!(verdict.kind, VerdictKind::AccessDenied);
        assert!(verdict.confidence.abs() < f64::EPSILON);

        let empty = classifier(Some(json!({"description": "no verdict field"})))
            .classify(&PageContent::new("https://x.example", "<html></html>"))
            .await;
        assert_eq!(empty.kind, VerdictKind::AccessDenied);
    }

    #[test]
    fn test_heuristic_signals() {
        let page = PageContent::new("https://x", "<title>Just a moment...</title>");
        assert_eq!(heuristic_signals(&page).block, Some(VerdictKind::JsChallenge));

        let page = PageContent::new("https://x", "<p>Too many requests</p>");
        assert_eq!(heuristic_signals(&page).block, Some(VerdictKind::RateLimited));

        let page = PageContent::new("https://x", LISTING);
        assert_eq!(
            heuristic_signals(&page),
            Signals {
                block: None,
                content: true
            }
        );
    }

    #[test]
    fn test_confidence_clamped() {
        let verdict = PageVerdict::new(VerdictKind::Usable, 4.2, "");
        assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);
        let verdict = PageVerdict::new(VerdictKind::Usable, f64::NAN, "");
        assert!(verdict.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_unreachable_is_safe_default() {
        let verdict = PageVerdict::unreachable(&BrowserError::Timeout("30s".into()));
        assert_eq!(verdict.kind, VerdictKind::AccessDenied);
        assert!(verdict.confidence.abs() < f64::EPSILON);
    }
}
