//! Retry/backoff decisions.
//!
//! [`decide`] is a pure function of the verdict, the current [`RetryState`]
//! and the settings. It returns the next state alongside the action so the
//! caller never mutates counters by hand.

use crate::classifier::{PageVerdict, VerdictKind};
use scout_core::{ScrapeSettings, WorkItemKey};
use std::time::Duration;

/// Per-item retry bookkeeping, owned by one orchestration loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Item the counters belong to
    pub key: WorkItemKey,
    /// Non-usable verdicts since the last successful re-resolution
    pub attempt_count: u32,
    /// Blocking verdicts since the last usable page
    pub consecutive_block_count: u32,
    /// Seconds spent in policy waits over the whole loop
    pub total_waited_secs: u64,
}

impl RetryState {
    /// Fresh counters for an item.
    #[must_use]
    pub fn new(key: WorkItemKey) -> Self {
        Self {
            key,
            attempt_count: 0,
            consecutive_block_count: 0,
            total_waited_secs: 0,
        }
    }

    /// Account for time actually spent waiting.
    pub fn record_wait(&mut self, waited: Duration) {
        self.total_waited_secs = self.total_waited_secs.saturating_add(waited.as_secs());
    }

    /// Counters after a successful rediscovery; the waited total is kept.
    #[must_use]
    pub fn after_reresolve(&self) -> Self {
        Self {
            attempt_count: 0,
            consecutive_block_count: 0,
            ..self.clone()
        }
    }
}

/// What the loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Page is usable; extract it
    Proceed,
    /// Sleep, then fetch the same target again
    Wait(Duration),
    /// Fetch the same target again immediately
    RetryNow,
    /// Invalidate the entry URL and rediscover it
    Reresolve,
    /// Stop the item with `RetriesExhausted`
    GiveUp,
}

/// Outcome of one policy decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Action to take
    pub action: Action,
    /// Counters after this verdict
    pub next: RetryState,
}

/// Decide how to react to a verdict.
///
/// Every non-usable verdict increments `attempt_count`; CAPTCHA, access-denied
/// and JS-challenge verdicts also increment `consecutive_block_count`. A usable
/// verdict resets `consecutive_block_count` only.
#[must_use]
pub fn decide(verdict: &PageVerdict, state: &RetryState, settings: &ScrapeSettings) -> Decision {
    let mut next = state.clone();

    if verdict.kind == VerdictKind::Usable {
        next.consecutive_block_count = 0;
        return Decision {
            action: Action::Proceed,
            next,
        };
    }

    next.attempt_count = next.attempt_count.saturating_add(1);
    if matches!(
        verdict.kind,
        VerdictKind::CaptchaChallenge | VerdictKind::AccessDenied | VerdictKind::JsChallenge
    ) {
        next.consecutive_block_count = next.consecutive_block_count.saturating_add(1);
    }

    let action = if next.attempt_count > settings.max_attempts {
        Action::GiveUp
    } else {
        match verdict.kind {
            VerdictKind::Usable => Action::Proceed,
            VerdictKind::CaptchaChallenge => {
                if next.consecutive_block_count > settings.captcha_max_retries {
                    Action::GiveUp
                } else {
                    Action::Wait(settings.captcha_wait)
                }
            }
            VerdictKind::JsChallenge => {
                if next.consecutive_block_count > settings.captcha_max_retries {
                    Action::GiveUp
                } else if settings.js_challenge_wait.is_zero() {
                    Action::RetryNow
                } else {
                    Action::Wait(settings.js_challenge_wait)
                }
            }
            VerdictKind::RateLimited => {
                Action::Wait(settings.rate_limit_wait.saturating_mul(next.attempt_count))
            }
            VerdictKind::AccessDenied => {
                if next.consecutive_block_count > settings.access_denied_max_retries {
                    Action::GiveUp
                } else {
                    Action::Wait(settings.access_denied_wait)
                }
            }
            VerdictKind::NotFound => Action::Reresolve,
        }
    };

    Decision { action, next }
}
