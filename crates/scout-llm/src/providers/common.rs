//! HTTP plumbing shared by the providers.

use crate::error::{LlmError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client with a request timeout.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(LlmError::Network)
}

/// Decode a provider response body, mapping HTTP failures to [`LlmError`].
pub async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(status_error(provider, status, message));
    }

    response.json().await.map_err(|e| LlmError::ParseError {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

fn status_error(provider: &str, status: StatusCode, message: String) -> LlmError {
    let provider = provider.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded { provider, message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::AuthenticationFailed { provider, message }
        }
        _ => LlmError::ApiError {
            provider,
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_builds() {
        assert!(http_client(Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn test_status_error_mapping() {
        let err = status_error("anthropic", StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(matches!(err, LlmError::RateLimitExceeded { .. }));

        let err = status_error("openai", StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(matches!(err, LlmError::AuthenticationFailed { .. }));

        let err = status_error("ollama", StatusCode::INTERNAL_SERVER_ERROR, "boom".into());
        assert!(matches!(err, LlmError::ApiError { status: 500, .. }));
    }
}
