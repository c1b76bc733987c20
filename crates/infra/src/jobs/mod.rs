//! Asynchronous export jobs and the retry loop that waits on them.
//!
//! - `retry`: bounded polling with backoff, a pluggable sleeper and cancellation
//! - `activity_export`: create/enqueue/poll/cancel lifecycle for bulk activity exports

pub mod activity_export;
pub mod retry;

#[cfg(test)]
pub mod testing;

pub use activity_export::{BulkActivityExport, ExportError, PollHint};
pub use retry::{
    Attempt, BackoffStrategy, RetryError, RetryExecutor, RetryPolicy, Sleeper, TokioSleeper,
};
