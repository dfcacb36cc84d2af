//! Find-or-create-or-update reconciliation of customers against CRM contacts.

pub mod customer;

pub use customer::CustomerRecord;

use std::fmt;

use crate::crm::ContactApi;
use crate::error::Result;

/// What a reconcile call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated { id: u64 },
    Unchanged { id: u64 },
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated { id } => write!(f, "updated contact {id}"),
            Self::Unchanged { id } => write!(f, "contact {id} already up to date"),
        }
    }
}

/// Keeps one contact per customer email in sync with the customer's phone.
///
/// Safe to share across tasks; it holds no state of its own.
#[derive(Debug, Clone)]
pub struct Reconciler<C> {
    api: C,
}

impl<C: ContactApi> Reconciler<C> {
    pub fn new(api: C) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    /// Create the contact if absent, update it if its phone drifted.
    pub async fn reconcile(&self, customer: &CustomerRecord) -> Result<ReconcileOutcome> {
        let outcome = match self.api.find_contact_by_email(customer.email()).await? {
            None => {
                self.api
                    .create_contact(customer.name(), customer.email(), customer.phone())
                    .await?;
                ReconcileOutcome::Created
            }
            Some(contact) if contact.phone().as_deref() == Some(customer.phone()) => {
                ReconcileOutcome::Unchanged { id: contact.id }
            }
            Some(contact) => {
                tracing::debug!(
                    contact_id = contact.id,
                    stored = contact.phone().as_deref().unwrap_or("<none>"),
                    "phone drift detected"
                );
                self.api
                    .update_contact(
                        contact.id,
                        customer.name(),
                        customer.email(),
                        customer.phone(),
                    )
                    .await?;
                ReconcileOutcome::Updated { id: contact.id }
            }
        };
        tracing::info!(%outcome, "customer reconciled");
        Ok(outcome)
    }
}
