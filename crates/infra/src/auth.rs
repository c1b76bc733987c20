//! Client-credentials access tokens from the identity endpoint.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::transport::TransportError;

/// Tokens are refreshed this long before the server says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on how long a token is cached, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_after: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_after
    }
}

/// Fetches and caches the bearer token used on every REST call.
pub struct TokenProvider {
    identity: String,
    client_id: String,
    client_secret: String,
    cached: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("identity", &self.identity)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl TokenProvider {
    pub fn new(
        identity: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: RwLock::new(None),
        }
    }

    /// Current token, fetching a new one when none is cached or it is about to expire.
    pub async fn bearer(&self, client: &reqwest::Client) -> Result<String, TransportError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch(client).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<CachedToken, TransportError> {
        let url = format!("{}/oauth/token", self.identity.trim_end_matches('/'));
        debug!(identity = %self.identity, "requesting access token");

        let response = client
            .get(&url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Auth(format!("identity returned {status}: {body}")));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::Auth(format!("malformed token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(TransportError::Auth("identity returned an empty access token".to_string()));
        }

        let now = Instant::now();
        let refresh_after = now.checked_add(cache_lifetime(token.expires_in)).unwrap_or(now);
        Ok(CachedToken {
            value: token.access_token,
            refresh_after,
        })
    }
}

/// How long to reuse a token the server says lives `expires_in` seconds.
fn cache_lifetime(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in)
        .min(MAX_TOKEN_LIFETIME)
        .saturating_sub(EXPIRY_MARGIN)
}
