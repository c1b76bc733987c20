//! Infrastructure layer: HTTP transport, authentication, config and the export job lifecycle.

pub mod auth;
pub mod config;
pub mod jobs;
pub mod rows;
pub mod transport;

#[cfg(test)]
mod integration_tests;

pub use config::{ClientConfig, ConfigError};
pub use jobs::{BulkActivityExport, ExportError, RetryExecutor, RetryPolicy};
pub use rows::{ActivityRecord, ExportRows};
pub use transport::{HttpTransport, Transport, TransportError};
