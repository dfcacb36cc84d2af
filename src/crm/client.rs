//! Authenticated client for the contacts API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use super::contact::{Contact, ContactPayload, ContactsResponse};
use super::http::{error_body, status_to_error, ApiHttp};
use super::middleware::{AccessTokenSource, BearerAuth};
use super::ContactApi;
use crate::error::{CrmError, Result};

/// Contacts collection path relative to the API base URL.
pub const CONTACTS_PATH: &str = "api/v4/contacts";

/// Contacts API client.
///
/// Every request passes through [`BearerAuth`]. A 401 drops the rejected token
/// and the request is sent once more; a second 401 is an auth failure.
#[derive(Clone)]
pub struct CrmClient {
    http: ApiHttp,
    auth: BearerAuth,
}

impl CrmClient {
    pub fn new(http: ApiHttp, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self::with_auth(http, BearerAuth::new(tokens))
    }

    pub fn with_auth(http: ApiHttp, auth: BearerAuth) -> Self {
        Self { http, auth }
    }

    pub fn http(&self) -> &ApiHttp {
        &self.http
    }

    async fn execute<F>(&self, method: Method, path: &str, build: F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let mut retried = false;
        loop {
            let request = build(self.http.request(method.clone(), path));
            let (request, token) = self.auth.apply(path, request).await?;
            let response = request.send().await.map_err(|err| {
                tracing::error!(%method, path, error = %err, "contacts request failed");
                CrmError::from(err)
            })?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                if let Some(rejected) = token.as_deref() {
                    tracing::warn!(%method, path, "unauthorized; refreshing token and retrying once");
                    self.auth.invalidate(rejected);
                    retried = true;
                    continue;
                }
            }
            if !status.is_success() {
                let body = error_body(response).await;
                tracing::error!(%method, path, status = status.as_u16(), %body, "contacts API error");
                return Err(status_to_error(status.as_u16(), &body));
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl ContactApi for CrmClient {
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        let response = self
            .execute(Method::GET, CONTACTS_PATH, |req| req.query(&[("query", email)]))
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            tracing::debug!("no contact matches email");
            return Ok(None);
        }
        let body = response.text().await.map_err(|err| {
            tracing::error!(error = %err, "failed to read contact search response");
            CrmError::from(err)
        })?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let parsed: ContactsResponse = serde_json::from_str(&body).map_err(|err| {
            tracing::error!(error = %err, %body, "unparseable contact search response");
            CrmError::from(err)
        })?;
        Ok(parsed.into_first())
    }

    async fn create_contact(&self, name: &str, email: &str, phone: &str) -> Result<()> {
        let payload = [ContactPayload::new(name, email, phone)];
        self.execute(Method::POST, CONTACTS_PATH, |req| req.json(&payload))
            .await?;
        tracing::info!("contact created");
        Ok(())
    }

    async fn update_contact(&self, id: u64, name: &str, email: &str, phone: &str) -> Result<()> {
        let payload = [ContactPayload::new(name, email, phone).with_id(id)];
        self.execute(Method::PATCH, CONTACTS_PATH, |req| req.json(&payload))
            .await?;
        tracing::info!(contact_id = id, "contact updated");
        Ok(())
    }
}
