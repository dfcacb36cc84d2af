//! Error types for crmsync.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all crmsync operations.
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisted credential store unreadable or unwritable.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No usable credential at startup.
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// Transient refresh failure; the next caller triggers another attempt.
    #[error("Token refresh error: {0}")]
    TokenRefresh(String),

    /// Refresh token rejected, or a request still unauthorized after one retry.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Provider error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CrmError {
    /// Create a provider error from a non-2xx response.
    pub fn provider(status: u16, body: impl Into<String>) -> Self {
        Self::Provider {
            status,
            body: body.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Authentication,
            Self::Bootstrap(_) => ErrorCategory::Bootstrap,
            Self::TokenRefresh(_) => ErrorCategory::Refresh,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::Provider { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Provider,
            },
        }
    }

    /// Whether this error is potentially retryable by a later call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Refresh
                | ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication | ErrorCategory::Bootstrap => {
                RecoverySuggestion::Rebootstrap
            }
            ErrorCategory::Refresh
            | ErrorCategory::RateLimit
            | ErrorCategory::Network
            | ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Storage => RecoverySuggestion::CheckStorage,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Validation => RecoverySuggestion::FixInput,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CrmError>;
