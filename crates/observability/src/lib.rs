//! Tracing/logging setup shared by the export client binaries.

/// Subscriber installation and output format selection.
pub mod subscriber;

pub use subscriber::{LogFormat, ParseLogFormatError, init};
