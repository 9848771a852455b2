//! Shared plumbing for calls to generative providers.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Video generation timed out")]
    OperationTimedOut,
    #[error("Invalid GCS URI format: {0}")]
    InvalidGcsUri(String),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Timeouts and throttling; the same call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(..)
            | ProviderError::RateLimited(_)
            | ProviderError::OperationTimedOut => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Run a provider call with an upper bound on its duration.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(what.to_string(), limit)),
    }
}

/// Map a non-success HTTP response into a provider error.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited(body));
    }
    Err(ProviderError::Api {
        status: status.as_u16(),
        body,
    })
}
