//! Error types for the fetch pipeline.
//!
//! Low-level network failures are absorbed at the fetcher boundary; only
//! structurally fatal conditions (misconfiguration, zero registered
//! adapters) may terminate a whole run.

use thiserror::Error;

/// Errors that can occur while fetching from an upstream platform.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream returned a non-2xx response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body or status text from upstream.
        message: String,
    },

    /// Upstream rate-limited the request (429 or equivalent).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds to wait, from the Retry-After header when present.
        retry_after_ms: u64,
    },

    /// Network-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Upstream payload could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Local misconfiguration (bad URL, missing adapter, ...).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FetchError {
    /// Creates an API error from status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub const fn rate_limited(retry_after_ms: u64) -> Self {
        Self::RateLimited { retry_after_ms }
    }

    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Malformed(_) | Self::Configuration(_) => false,
        }
    }

    /// Retry-After hint in milliseconds, if the upstream provided one.
    #[must_use]
    pub const fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_construction() {
        let err = FetchError::api(503, "service unavailable");
        assert!(matches!(err, FetchError::Api { status: 503, .. }));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Network("refused".into()).is_transient());
        assert!(FetchError::Timeout("deadline".into()).is_transient());
        assert!(FetchError::rate_limited(1000).is_transient());
        assert!(FetchError::api(500, "boom").is_transient());
        assert!(!FetchError::api(400, "bad request").is_transient());
        assert!(!FetchError::Malformed("bad json".into()).is_transient());
        assert!(!FetchError::Configuration("no adapter".into()).is_transient());
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        assert_eq!(FetchError::rate_limited(2500).retry_after_ms(), Some(2500));
        assert_eq!(FetchError::api(429, "slow down").retry_after_ms(), None);
    }
}
