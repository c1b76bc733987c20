//! API-level failure model.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Result type for anything that normalizes a response envelope.
pub type ApiResult<T> = Result<T, ApiFailure>;

/// One entry of the `errors` array of a response envelope.
///
/// Marketo sends `code` as a string (`"1029"`); some gateways send a number.
/// Both decode to `Some(u32)`, anything unparsable to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: String,
}

impl ErrorDetail {
    pub fn new(code: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCode {
    Number(u32),
    Text(String),
}

fn deserialize_code<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawCode>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawCode::Number(n)) => Some(n),
        Some(RawCode::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// The server answered with `success: false`.
///
/// Always carries a human-readable message; `code` is the vendor error code
/// when one was reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiFailure {
    pub message: String,
    pub code: Option<u32>,
    pub request_id: Option<String>,
}

impl ApiFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            request_id: None,
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
