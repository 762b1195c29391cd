use std::time::Duration;

/// Errors surfaced by generation capabilities.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    /// The capability exists but cannot serve requests right now.
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// The underlying provider rejected or failed the request.
    #[error("provider {name} failed: {detail}")]
    Provider { name: String, detail: String },

    /// No response within the configured budget.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the in-flight call.
    #[error("generation cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Whether a different capability is worth trying after this failure.
    /// Cancellation is a caller decision, never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Short classification string for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_retryable() {
        assert!(!GatewayError::Cancelled.is_retryable());
        assert!(GatewayError::Unavailable("x".into()).is_retryable());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GatewayError::Provider {
            name: "p".into(),
            detail: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn kind_strings() {
        assert_eq!(GatewayError::Cancelled.kind(), "cancelled");
        assert_eq!(GatewayError::Unavailable("x".into()).kind(), "unavailable");
        assert_eq!(
            GatewayError::Provider {
                name: "p".into(),
                detail: "d".into()
            }
            .kind(),
            "provider_error"
        );
    }
}
