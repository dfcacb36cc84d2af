use thiserror::Error;

use crate::error::CrmError;

/// Failures of the persistent token store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record has been written yet (first run).
    #[error("No persisted credential at {0}")]
    NotFound(String),
    /// The stored blob does not parse into a token pair.
    #[error("Persisted credential is corrupt: {0}")]
    Corruption(String),
    /// The underlying medium is unreadable or unwritable.
    #[error("Credential storage failure: {0}")]
    Storage(String),
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<StoreError> for CrmError {
    fn from(error: StoreError) -> Self {
        CrmError::Storage(error.to_string())
    }
}
