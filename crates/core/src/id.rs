//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ApiFailure;

/// Server-assigned identifier of a bulk export job.
///
/// Returned by the create call and used as the key for every later call
/// (enqueue, status, cancel, file). Ids decoded from responses go through the
/// same validation as [`FromStr`], since they end up as URL path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExportId(String);

impl ExportId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ExportId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExportId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl TryFrom<String> for ExportId {
    type Error = ApiFailure;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExportId> for String {
    fn from(id: ExportId) -> Self {
        id.0
    }
}

impl AsRef<str> for ExportId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ExportId {
    type Err = ApiFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(ApiFailure::new(format!("invalid export id: {s:?}")));
        }
        Ok(Self(trimmed.to_string()))
    }
}
