//! Shared HTTP plumbing for the discovery clients.

use std::time::Duration;

use reqwest::Response;

use crate::retry::RetryPolicy;

/// Upper bound on establishing a connection, whatever the request budget.
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default budget for one request attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl FetchError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let msg = err.to_string();
        if err.is_timeout() {
            Self::Timeout(msg)
        } else if err.is_connect() {
            Self::Connection(msg)
        } else if err.is_decode() {
            Self::Deserialization(msg)
        } else {
            Self::Request(msg)
        }
    }
}

/// Per-attempt time budget and retry settings shared by the API clients.
///
/// The request timeout bounds one attempt from connect to the last body
/// byte. Retries get a fresh budget each.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Budget for one attempt.
    pub request_timeout: Duration,
    /// Budget for the TCP and TLS handshake, never above the request budget.
    pub connect_timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT, RetryPolicy::default())
    }
}

impl FetchPolicy {
    /// Create a policy; the connect budget is capped at [`MAX_CONNECT_TIMEOUT`].
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            request_timeout,
            connect_timeout: request_timeout.min(MAX_CONNECT_TIMEOUT),
            retry,
        }
    }

    /// Override the connect budget.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.min(self.request_timeout);
        self
    }

    /// Build a `reqwest` client honouring the timeouts.
    pub fn build_http(&self) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(concat!("discovery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn non-success responses into `FetchError::Http`, keeping the body
/// text for diagnostics.
pub(crate) async fn check_status(resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(FetchError::Http {
        status: status.as_u16(),
        url,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://api.example.com/prod/", "/projects"),
            "https://api.example.com/prod/projects"
        );
        assert_eq!(
            join_url("https://api.example.com", "projects/p1"),
            "https://api.example.com/projects/p1"
        );
    }

    #[test]
    fn test_connect_budget_is_capped() {
        let policy = FetchPolicy::new(Duration::from_secs(30), RetryPolicy::default());
        assert_eq!(policy.connect_timeout, MAX_CONNECT_TIMEOUT);

        let short = FetchPolicy::new(Duration::from_secs(2), RetryPolicy::default());
        assert_eq!(short.connect_timeout, Duration::from_secs(2));

        let custom = short.with_connect_timeout(Duration::from_secs(10));
        assert_eq!(custom.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_status_accessor() {
        let err = FetchError::Http {
            status: 404,
            url: "u".into(),
            body: String::new(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(FetchError::Timeout("t".into()).status(), None);
    }
}
