//! Confirms that a discovered candidate URL really is an advisor directory.

use crate::classifier::{confidence_value, PageClassifier};
use async_trait::async_trait;
use scout_browser::SessionFactory;
use scout_core::WorkItemKey;
use scout_llm::Reasoner;
use std::sync::Arc;

const VERIFY_PROMPT: &str = r#"Check whether this webpage is a financial advisor directory or advisor search page.

Respond with JSON:
{
    "is_advisor_directory": boolean,
    "confidence": "high|medium|low",
    "has_search_functionality": boolean
}"#;

/// Confidence at or below this value counts as "low".
const LOW_CONFIDENCE: f64 = 0.3;

/// Accepts or rejects a candidate entry URL.
#[async_trait]
pub trait CandidateVerifier: Send + Sync {
    /// Whether `url` is a working directory entry point for `key`.
    async fn verify(&self, key: &WorkItemKey, url: &str) -> bool;
}

/// Loads the candidate in a fresh tab, requires a usable page, then asks the
/// reasoner whether it is an advisor directory.
pub struct BrowserVerifier {
    sessions: Arc<dyn SessionFactory>,
    classifier: Arc<PageClassifier>,
    reasoner: Arc<dyn Reasoner>,
}

impl BrowserVerifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        classifier: Arc<PageClassifier>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Self {
        Self {
            sessions,
            classifier,
            reasoner,
        }
    }
}

#[async_trait]
impl CandidateVerifier for BrowserVerifier {
    async fn verify(&self, key: &WorkItemKey, url: &str) -> bool {
        let session = match self.sessions.open_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Could not open a tab to verify candidate");
                return false;
            }
        };

        let accepted = match session.navigate(url).await {
            Ok(page) => {
                let verdict = self.classifier.classify(&page).await;
                if verdict.is_usable() {
                    let prompt = format!("{VERIFY_PROMPT}\n\nURL: {url}");
                    match self.reasoner.reason(&prompt, &page.html).await {
                        Ok(judgment) => {
                            let is_directory =
                                judgment.bool_field("is_advisor_directory").unwrap_or(false);
                            let confidence = confidence_value(&judgment);
                            tracing::info!(
                                key = %key,
                                url,
                                is_directory,
                                confidence,
                                "Candidate verification"
                            );
                            is_directory && confidence > LOW_CONFIDENCE
                        }
                        Err(e) => {
                            tracing::warn!(url, error = %e, "Verification reasoning failed");
                            false
                        }
                    }
                } else {
                    tracing::info!(url, verdict = %verdict.kind, "Candidate not usable");
                    false
                }
            }
            Err(e) => {
                tracing::info!(url, error = %e, "Candidate failed to load");
                false
            }
        };

        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "Failed to close verification tab");
        }
        accepted
    }
}
