//! Two-legged access tokens
//!
//! The token request itself lives on [`crate::ViewDataClient::get_token`];
//! this module only holds the wire type and the cache that decides when a
//! fresh token is needed.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Tokens this close to expiry are refreshed before use
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Response from the authenticate endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

struct CachedToken {
    token: AccessToken,
    expires_at: Instant,
}

/// Last issued token, shared between clones of the client
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<Option<CachedToken>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached token
    pub async fn store(&self, token: AccessToken) {
        let mut guard = self.inner.lock().await;
        *guard = Some(CachedToken::new(token));
    }

    /// Return the cached bearer token, calling `fetch` if there is none or
    /// it expires within [`REFRESH_MARGIN`].
    ///
    /// The lock is held while fetching so that concurrent callers (e.g.
    /// parallel upload chunks) share a single token request.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        let mut guard = self.inner.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.access_token.clone());
            }
            tracing::debug!("Access token expires soon, refreshing");
        }

        let token = fetch().await?;
        let access_token = token.access_token.clone();
        *guard = Some(CachedToken::new(token));
        Ok(access_token)
    }
}

impl CachedToken {
    fn new(token: AccessToken) -> Self {
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        Self { token, expires_at }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}
