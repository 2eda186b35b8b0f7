//! Reasoning errors.

use thiserror::Error;

/// Failure of a reasoning call or of provider setup.
///
/// Callers in the scanner never retry on these; each call site falls back to
/// its own safe default.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Configuration names a backend this crate does not know
    #[error("unknown reasoning provider '{0}'")]
    UnknownProvider(String),

    /// The router has no provider eligible for the request
    #[error("no reasoning provider available")]
    NoProviderAvailable,

    /// Non-success HTTP status from a provider
    #[error("{provider} returned HTTP {status}: {message}")]
    ApiError {
        /// Backend name
        provider: String,
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// HTTP 429 from a provider
    #[error("{provider} rate limited the request: {message}")]
    RateLimitExceeded {
        /// Backend name
        provider: String,
        /// Response body
        message: String,
    },

    /// Missing or rejected credentials
    #[error("{provider} rejected credentials: {message}")]
    AuthenticationFailed {
        /// Backend name
        provider: String,
        /// Detail
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unreadable response from {provider}: {message}")]
    ParseError {
        /// Backend name
        provider: String,
        /// Decoder error
        message: String,
    },

    /// The model answered but no JSON object could be recovered
    #[error("malformed judgment: {0}")]
    MalformedJudgment(String),

    /// Transport failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The call exceeded its time budget
    #[error("reasoning call timed out after {seconds}s")]
    Timeout {
        /// Budget in seconds
        seconds: u64,
    },
}

/// Result alias for reasoning calls.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_provider() {
        let err = LlmError::ApiError {
            provider: "anthropic".to_string(),
            status: 529,
            message: "Overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "anthropic returned HTTP 529: Overloaded");

        let err = LlmError::UnknownProvider("gemini".to_string());
        assert_eq!(err.to_string(), "unknown reasoning provider 'gemini'");
    }

    #[test]
    fn test_timeout_message() {
        let err = LlmError::Timeout { seconds: 60 };
        assert_eq!(err.to_string(), "reasoning call timed out after 60s");
    }
}
