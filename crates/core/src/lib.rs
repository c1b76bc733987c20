//! `marketo-core`: wire model for the Marketo bulk activity export API.
//!
//! This crate is **pure data**: response envelopes, failures, identifiers and
//! export job records. No I/O lives here.

pub mod envelope;
pub mod error;
pub mod export;
pub mod id;
pub mod path;

pub use envelope::ApiResponse;
pub use error::{ApiFailure, ApiResult, ErrorDetail};
pub use export::{
    ActivityExportFilter, ActivityExportRequest, DateRange, ExportFormat, ExportJob, ExportOptions,
    ExportStatus,
};
pub use id::ExportId;
pub use path::bulk_path;
