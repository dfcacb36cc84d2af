//! Contacts API: HTTP plumbing, bearer middleware, wire types and client.

pub mod client;
pub mod contact;
pub mod http;
pub mod middleware;

pub use client::{CrmClient, CONTACTS_PATH};
pub use contact::{Contact, ContactPayload, CustomField, FieldCode, FieldValue};
pub use http::ApiHttp;
pub use middleware::{AccessTokenSource, BearerAuth};

use async_trait::async_trait;

use crate::error::Result;

/// The three contact operations the reconciler relies on.
#[async_trait]
pub trait ContactApi: Send + Sync {
    /// First contact matching `email`, if any.
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>>;

    async fn create_contact(&self, name: &str, email: &str, phone: &str) -> Result<()>;

    async fn update_contact(&self, id: u64, name: &str, email: &str, phone: &str) -> Result<()>;
}
