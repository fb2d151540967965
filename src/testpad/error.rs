use std::time::Duration;

/// Failures surfaced by the Testpad transport and the round orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TestpadError {
    #[error("No API key configured")]
    Unauthenticated,

    #[error("Invalid API key")]
    InvalidCredential,

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error. Please check your connection. ({0})")]
    Network(String),

    #[error("{0}")]
    Validation(String),

    #[error("Duplication failed: {0}")]
    DuplicationFailed(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl TestpadError {
    /// Only rate limiting is worth waiting out; everything else fails fast.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TestpadError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TestpadError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }

    /// Stable machine-readable tag used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TestpadError::Unauthenticated => "unauthenticated",
            TestpadError::InvalidCredential => "invalid_credential",
            TestpadError::RateLimited { .. } => "rate_limited",
            TestpadError::Api { .. } => "api_error",
            TestpadError::Network(_) => "network_error",
            TestpadError::Validation(_) => "validation_error",
            TestpadError::DuplicationFailed(_) => "duplication_failed",
            TestpadError::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(TestpadError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(!TestpadError::InvalidCredential.is_retryable());
        assert!(!TestpadError::Network("refused".into()).is_retryable());
        assert!(!TestpadError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let err = TestpadError::RateLimited { retry_after_secs: 7 };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(TestpadError::Unauthenticated.retry_after(), None);
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = TestpadError::Validation("Source folder contains no scripts".into());
        assert_eq!(err.to_string(), "Source folder contains no scripts");
        assert_eq!(err.kind(), "validation_error");
    }
}
