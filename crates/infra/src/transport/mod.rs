//! HTTP transport boundary.
//!
//! [`Transport`] moves raw JSON/text; [`fetch_envelope`] and [`submit_envelope`]
//! are the single place where bodies are decoded into typed envelopes.

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use marketo_core::ApiResponse;

pub use http::HttpTransport;

/// Query string pairs.
pub type Query<'a> = &'a [(&'a str, String)];

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status {status} from {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Executes requests against the REST endpoint.
///
/// Implementations must be safe to share between concurrently running export
/// jobs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, query: Query<'_>) -> Result<JsonValue, TransportError>;

    async fn post(&self, path: &str, body: &JsonValue) -> Result<JsonValue, TransportError>;

    /// GET returning the raw body (file downloads).
    async fn get_text(&self, path: &str, query: Query<'_>) -> Result<String, TransportError>;
}

/// Decode a response body into a typed envelope.
pub fn decode_envelope<R: DeserializeOwned>(
    path: &str,
    value: JsonValue,
) -> Result<ApiResponse<R>, TransportError> {
    serde_json::from_value(value).map_err(|source| TransportError::Decode {
        path: path.to_string(),
        source,
    })
}

/// GET `path` and decode the envelope.
pub async fn fetch_envelope<T, R>(
    transport: &T,
    path: &str,
    query: Query<'_>,
) -> Result<ApiResponse<R>, TransportError>
where
    T: Transport + ?Sized,
    R: DeserializeOwned,
{
    let value = transport.get(path, query).await?;
    decode_envelope(path, value)
}

/// POST `body` to `path` and decode the envelope.
pub async fn submit_envelope<T, R>(
    transport: &T,
    path: &str,
    body: &JsonValue,
) -> Result<ApiResponse<R>, TransportError>
where
    T: Transport + ?Sized,
    R: DeserializeOwned,
{
    let value = transport.post(path, body).await?;
    decode_envelope(path, value)
}
