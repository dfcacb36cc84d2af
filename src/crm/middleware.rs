//! Bearer-token injection stage of the request pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::auth::grant::TOKEN_PATH;
use crate::error::Result;

/// Anything that can hand out a currently valid access token.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;

    /// The API rejected `rejected`. Forget it so the next call obtains a
    /// fresh token, unless it has already been replaced.
    fn invalidate(&self, rejected: &str);
}

/// Attaches `Authorization: Bearer` to every request whose path is not on
/// the exempt list.
///
/// Token-exchange paths are exempt: they authenticate with the client
/// secret, and routing them through the token source would recurse.
#[derive(Clone)]
pub struct BearerAuth {
    source: Arc<dyn AccessTokenSource>,
    exempt: Vec<String>,
}

impl BearerAuth {
    pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            source,
            exempt: vec![normalize_path(TOKEN_PATH)],
        }
    }

    /// Replace the list of paths that bypass token injection.
    pub fn with_exempt_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exempt = paths
            .into_iter()
            .map(|p| normalize_path(p.as_ref()))
            .collect();
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.exempt.iter().any(|p| *p == path)
    }

    /// Run the stage: attach a bearer token unless `path` is exempt.
    ///
    /// Returns the request with the token that was attached, if any.
    pub async fn apply(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<(RequestBuilder, Option<String>)> {
        if self.is_exempt(path) {
            tracing::trace!(path, "skipping bearer injection for token endpoint");
            return Ok((request, None));
        }
        let token = self.source.access_token().await?;
        Ok((request.bearer_auth(&token), Some(token)))
    }

    pub fn invalidate(&self, rejected: &str) {
        self.source.invalidate(rejected);
    }
}

fn normalize_path(path: &str) -> String {
    let without_query = path.split('?').next().unwrap_or_default();
    without_query.trim_matches('/').to_ascii_lowercase()
}
