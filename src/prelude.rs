//! Convenience re-exports for common use.

pub use crate::auth::{CredentialManager, CredentialState, TokenPair, TokenStore};
pub use crate::config::CrmConfig;
pub use crate::crm::{ContactApi, CrmClient};
pub use crate::error::{CrmError, Result};
pub use crate::reconcile::{CustomerRecord, ReconcileOutcome, Reconciler};
