//! `reqwest`-backed transport with bearer authentication.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::config::ClientConfig;

use super::{Query, Transport, TransportError};

/// Error codes the REST API uses for a missing, invalid or expired token.
const TOKEN_REJECTED_CODES: [&str; 3] = ["601", "602", "600"];

/// Transport against a real REST endpoint.
///
/// Cheap to share: `reqwest::Client` pools connections internally and the
/// token cache is behind an async lock.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth: TokenProvider,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth: TokenProvider::new(&config.identity, &config.client_id, &config.client_secret),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, TransportError> {
        let token = self.auth.bearer(&self.client).await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json(
        &self,
        build: impl Fn() -> RequestBuilder,
        path: &str,
    ) -> Result<JsonValue, TransportError> {
        let value = self.read_json(self.send(build(), path).await?, path).await?;
        if !token_rejected(&value) {
            return Ok(value);
        }

        warn!(path, "access token rejected; refreshing and retrying once");
        self.auth.invalidate().await;
        self.read_json(self.send(build(), path).await?, path).await
    }

    async fn read_json(&self, response: Response, path: &str) -> Result<JsonValue, TransportError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| TransportError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// `success: false` with a token error code means the request never ran.
fn token_rejected(value: &JsonValue) -> bool {
    if value.get("success").and_then(JsonValue::as_bool) != Some(false) {
        return false;
    }

    value
        .get("errors")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .filter_map(|e| e.get("code"))
        .any(|code| {
            let code = match code {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            TOKEN_REJECTED_CODES.contains(&code.as_str())
        })
}

/// A raw body that is really a token-rejection envelope rather than file content.
fn text_token_rejected(text: &str) -> bool {
    text.trim_start().starts_with('{')
        && serde_json::from_str::<JsonValue>(text).is_ok_and(|value| token_rejected(&value))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: Query<'_>) -> Result<JsonValue, TransportError> {
        debug!(path, "GET");
        let url = self.url(path);
        self.send_json(|| self.client.get(&url).query(query), path).await
    }

    async fn post(&self, path: &str, body: &JsonValue) -> Result<JsonValue, TransportError> {
        debug!(path, "POST");
        let url = self.url(path);
        self.send_json(|| self.client.post(&url).json(body), path).await
    }

    async fn get_text(&self, path: &str, query: Query<'_>) -> Result<String, TransportError> {
        debug!(path, "GET (text)");
        let url = self.url(path);
        let build = || self.client.get(&url).query(query);

        let text = self.send(build(), path).await?.text().await?;
        if !text_token_rejected(&text) {
            return Ok(text);
        }

        warn!(path, "access token rejected on download; refreshing and retrying once");
        self.auth.invalidate().await;
        Ok(self.send(build(), path).await?.text().await?)
    }
}
