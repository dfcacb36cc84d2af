//! Error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Bootstrap,
    Refresh,
    Storage,
    RateLimit,
    Network,
    Timeout,
    Server,
    Provider,
    Configuration,
    Serialization,
    Validation,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Retry later; transient failures clear on their own.
    RetryWithBackoff,
    /// Run the authorization-code exchange again (`crmsync auth bootstrap`).
    Rebootstrap,
    IncreaseTimeout,
    CheckStorage,
    CheckConfiguration,
    FixInput,
    ContactSupport,
}

impl RecoverySuggestion {
    /// Short operator-facing hint, if there is anything useful to say.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RetryWithBackoff => Some("the failure looks transient; try again shortly"),
            Self::Rebootstrap => Some("run `crmsync auth bootstrap --code <CODE>`"),
            Self::IncreaseTimeout => Some("raise CRM_REFRESH_TIMEOUT_SECS"),
            Self::CheckStorage => Some("check that the token file location is writable"),
            Self::CheckConfiguration => Some("check CRM_* environment variables and env files"),
            Self::FixInput => None,
            Self::ContactSupport => None,
        }
    }
}
