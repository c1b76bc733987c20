//! Bulk activity export job model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::id::ExportId;

/// Job status as reported by the server.
///
/// Only `Queued` and `Processing` mean "still running"; every other value,
/// including statuses this client does not know, ends polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportStatus {
    Created,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ExportStatus::Queued | ExportStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Created => "Created",
            ExportStatus::Queued => "Queued",
            ExportStatus::Processing => "Processing",
            ExportStatus::Completed => "Completed",
            ExportStatus::Failed => "Failed",
            ExportStatus::Cancelled => "Cancelled",
            ExportStatus::Unknown => "Unknown",
        }
    }
}

impl core::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File format of the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Ssv,
}

impl ExportFormat {
    /// Field delimiter of the exported file.
    pub fn delimiter(&self) -> u8 {
        match self {
            ExportFormat::Csv => b',',
            ExportFormat::Tsv => b'\t',
            ExportFormat::Ssv => b' ',
        }
    }
}

/// One export job record (`result[0]` of create/enqueue/status/cancel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub export_id: ExportId,
    pub status: ExportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ExportFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_records: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl ExportJob {
    /// Minimal record with only id and status set.
    pub fn new(export_id: impl Into<ExportId>, status: ExportStatus) -> Self {
        Self {
            export_id: export_id.into(),
            status,
            format: None,
            created_at: None,
            queued_at: None,
            started_at: None,
            finished_at: None,
            number_of_records: None,
            file_size: None,
            file_checksum: None,
            error_msg: None,
        }
    }
}

/// Inclusive creation-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }
}

/// Filter of an activity export.
///
/// `createdAt` and `activityTypeIds` are typed; any other filter key the API
/// accepts goes into `extra` and is sent as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityExportFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity_type_ids: Vec<u32>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ActivityExportFilter {
    pub fn created_between(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(DateRange::new(start_at, end_at)),
            ..Default::default()
        }
    }

    pub fn with_activity_types(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.activity_type_ids.extend(ids);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Optional job configuration sent alongside the filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ExportFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_header_names: BTreeMap<String, String>,
}

impl ExportOptions {
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_column_header(mut self, field: impl Into<String>, header: impl Into<String>) -> Self {
        self.column_header_names.insert(field.into(), header.into());
        self
    }
}

/// Body of the create call: the options with the filter attached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityExportRequest {
    #[serde(flatten)]
    pub options: ExportOptions,
    pub filter: ActivityExportFilter,
}

impl ActivityExportRequest {
    pub fn new(filter: ActivityExportFilter) -> Self {
        Self {
            options: ExportOptions::default(),
            filter,
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Effective file format (server default is CSV).
    pub fn format(&self) -> ExportFormat {
        self.options.format.unwrap_or_default()
    }
}
