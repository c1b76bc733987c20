//! Typed response envelope shared by every REST endpoint.
//!
//! ```json
//! { "requestId": "e42b#14272d07d78", "success": true, "result": [ ... ] }
//! { "requestId": "...", "success": false, "errors": [{ "code": "1003", "message": "..." }] }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ApiFailure, ApiResult, ErrorDetail};

const NO_ERROR_DETAILS: &str = "request failed without error details";

/// Response envelope, decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<R> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default = "Vec::new", alias = "results")]
    pub result: Vec<R>,
}

impl<R> ApiResponse<R> {
    /// Successful envelope carrying `result`.
    pub fn ok(result: Vec<R>) -> Self {
        Self {
            request_id: None,
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            result,
        }
    }

    /// Failed envelope with a single error entry.
    pub fn failed(code: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            request_id: None,
            success: false,
            errors: vec![ErrorDetail::new(code, message)],
            warnings: Vec::new(),
            result: Vec::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Build the failure for an unsuccessful envelope from its first error entry.
    pub fn failure(&self) -> ApiFailure {
        let (message, code) = match self.errors.first() {
            Some(detail) if !detail.message.is_empty() => (detail.message.clone(), detail.code),
            Some(detail) => (NO_ERROR_DETAILS.to_string(), detail.code),
            None => (NO_ERROR_DETAILS.to_string(), None),
        };

        ApiFailure {
            message,
            code,
            request_id: self.request_id.clone(),
        }
    }

    /// Normalize into the result records or the reported failure.
    pub fn into_result(self) -> ApiResult<Vec<R>> {
        if self.success {
            Ok(self.result)
        } else {
            Err(self.failure())
        }
    }

    /// Like [`Self::into_result`], keeping only the first record.
    pub fn into_first(self) -> ApiResult<Option<R>> {
        self.into_result().map(|records| records.into_iter().next())
    }
}
