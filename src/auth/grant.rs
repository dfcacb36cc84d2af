//! OAuth token endpoint: authorization-code and refresh-token grants.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

use super::token::TokenPair;
use crate::crm::http::{error_body, ApiHttp};

/// Token-exchange path relative to the API base URL.
pub const TOKEN_PATH: &str = "oauth2/access_token";

/// Why a grant request did not produce a token pair.
#[derive(Debug, Clone, Error)]
pub enum GrantError {
    /// The provider refused the code or refresh token; retrying cannot help.
    #[error("grant rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },
    /// Network failure, provider outage, or unusable response.
    #[error("grant request failed: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for GrantError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transient(error.to_string())
    }
}

/// The two OAuth grants the credential manager consumes.
#[async_trait]
pub trait TokenGrant: Send + Sync {
    /// One-time bootstrap: exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<TokenPair, GrantError>;

    /// Steady state: exchange a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, GrantError>;
}

/// Client credentials sent with every grant request.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum GrantRequest<'a> {
    AuthorizationCode {
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
    },
}

/// Issues grant requests against the provider's token endpoint.
///
/// Requests are sent without a bearer header; the client secret
/// authenticates them.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: ApiHttp,
    path: String,
    credentials: ClientCredentials,
}

impl TokenEndpoint {
    pub fn new(http: ApiHttp, credentials: ClientCredentials) -> Self {
        Self {
            http,
            path: TOKEN_PATH.to_string(),
            credentials,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn send(&self, grant: &GrantRequest<'_>) -> Result<TokenPair, GrantError> {
        let resp = self
            .http
            .request(Method::POST, &self.path)
            .json(grant)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await;
            return Err(classify_failure(status, body));
        }
        let pair: TokenPair = resp
            .json()
            .await
            .map_err(|err| GrantError::Transient(format!("invalid token response: {err}")))?;
        pair.validate()
            .map_err(|reason| GrantError::Transient(format!("invalid token response: {reason}")))?;
        Ok(pair)
    }
}

#[async_trait]
impl TokenGrant for TokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, GrantError> {
        self.send(&GrantRequest::AuthorizationCode {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            code,
            redirect_uri,
        })
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, GrantError> {
        self.send(&GrantRequest::RefreshToken {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            refresh_token,
        })
        .await
    }
}

fn classify_failure(status: StatusCode, body: String) -> GrantError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GrantError::Rejected {
                status: status.as_u16(),
                body,
            }
        }
        _ => GrantError::Transient(format!("status {}: {body}", status.as_u16())),
    }
}
