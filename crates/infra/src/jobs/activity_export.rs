//! Bulk activity export job lifecycle.
//!
//! Create → Enqueue → poll Status until terminal → (caller) File.
//!
//! Once the server has assigned an export id, every exit path except success
//! cancels the job: the id is held by an [`ExportLease`] that has to be
//! explicitly released.

use std::io::Cursor;
use std::sync::Arc;

use csv::StringRecord;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use marketo_core::{
    ActivityExportRequest, ApiFailure, ApiResponse, ExportFormat, ExportId, ExportJob, ExportStatus,
    bulk_path,
};

use super::retry::{Attempt, RetryError, RetryExecutor};
use crate::rows::{self, ExportRows};
use crate::transport::{Transport, TransportError, fetch_envelope, submit_envelope};

/// Export lifecycle failure.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The server answered `success: false`.
    #[error(transparent)]
    Api(#[from] ApiFailure),

    /// Polling ran out of retries while the job was still queued or processing.
    #[error("export {export_id} still {last_status} after {attempts} status checks")]
    StillRunning {
        export_id: ExportId,
        attempts: u32,
        last_status: ExportStatus,
        request_id: Option<String>,
    },

    /// The caller's cancellation token fired while waiting.
    #[error("export {export_id} was cancelled by the caller")]
    Cancelled { export_id: ExportId },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{operation} response carried no export job")]
    EmptyResult { operation: &'static str },

    #[error("failed to read export rows: {0}")]
    Rows(#[from] csv::Error),
}

/// Hint carried by a still-running status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollHint {
    pub request_id: Option<String>,
    pub status: ExportStatus,
}

#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    Create(&'a ActivityExportRequest),
    Enqueue(&'a ExportId),
    Status(&'a ExportId),
    Cancel(&'a ExportId),
}

impl Operation<'_> {
    fn name(&self) -> &'static str {
        match self {
            Operation::Create(_) => "create",
            Operation::Enqueue(_) => "enqueue",
            Operation::Status(_) => "status",
            Operation::Cancel(_) => "cancel",
        }
    }

    fn path(&self) -> String {
        match self {
            Operation::Create(_) => bulk_path(&["activities", "export", "create.json"]),
            Operation::Enqueue(id) => job_path(id, "enqueue.json"),
            Operation::Status(id) => job_path(id, "status.json"),
            Operation::Cancel(id) => job_path(id, "cancel.json"),
        }
    }
}

fn job_path(export_id: &ExportId, action: &str) -> String {
    bulk_path(&["activities", "export", export_id.as_str(), action])
}

async fn send<T>(transport: &T, op: Operation<'_>) -> Result<ApiResponse<ExportJob>, TransportError>
where
    T: Transport + ?Sized,
{
    let path = op.path();
    debug!(operation = op.name(), path = %path, "bulk export request");
    match op {
        Operation::Create(request) => {
            let body = serde_json::to_value(request).map_err(|source| TransportError::Encode {
                path: path.clone(),
                source,
            })?;
            submit_envelope(transport, &path, &body).await
        }
        Operation::Enqueue(_) | Operation::Cancel(_) => {
            submit_envelope(transport, &path, &JsonValue::Object(Default::default())).await
        }
        Operation::Status(_) => fetch_envelope(transport, &path, &[]).await,
    }
}

fn log_failure(operation: &'static str, failure: &ApiFailure) {
    warn!(
        operation,
        code = ?failure.code,
        request_id = ?failure.request_id,
        "{}",
        failure.message
    );
}

/// Normalize an envelope whose first record is required.
fn expect_job(operation: &'static str, envelope: ApiResponse<ExportJob>) -> Result<ExportJob, ExportError> {
    match envelope.into_first() {
        Ok(Some(job)) => Ok(job),
        Ok(None) => Err(ExportError::EmptyResult { operation }),
        Err(failure) => {
            log_failure(operation, &failure);
            Err(failure.into())
        }
    }
}

/// Normalize an envelope where only the success flag matters.
fn expect_success(
    operation: &'static str,
    envelope: ApiResponse<ExportJob>,
) -> Result<Option<ExportJob>, ExportError> {
    envelope.into_first().map_err(|failure| {
        log_failure(operation, &failure);
        failure.into()
    })
}

/// A JSON envelope with `success: false` where file content was expected.
fn embedded_failure(text: &str) -> Option<ApiFailure> {
    if !text.trim_start().starts_with('{') {
        return None;
    }
    let envelope: ApiResponse<JsonValue> = serde_json::from_str(text).ok()?;
    (!envelope.success).then(|| envelope.failure())
}

/// Best-effort cancel used for compensation; failures are logged, never returned.
async fn cancel_quietly<T>(transport: &T, export_id: &ExportId)
where
    T: Transport + ?Sized,
{
    match send(transport, Operation::Cancel(export_id)).await {
        Ok(envelope) => match envelope.into_result() {
            Ok(_) => info!(export_id = %export_id, "export job cancelled"),
            Err(failure) => warn!(
                export_id = %export_id,
                code = ?failure.code,
                "cancel rejected: {}",
                failure.message
            ),
        },
        Err(e) => warn!(export_id = %export_id, error = %e, "cancel request failed"),
    }
}

/// Holds a created export job; cancels it unless released.
struct ExportLease<T: Transport + 'static> {
    transport: Arc<T>,
    export_id: ExportId,
    armed: bool,
}

impl<T: Transport + 'static> ExportLease<T> {
    fn acquire(transport: Arc<T>, export_id: ExportId) -> Self {
        Self {
            transport,
            export_id,
            armed: true,
        }
    }

    fn export_id(&self) -> &ExportId {
        &self.export_id
    }

    /// Success path: keep the job.
    fn release(mut self) -> ExportId {
        self.armed = false;
        self.export_id.clone()
    }

    /// Failure path: cancel the job and wait for the attempt to finish.
    ///
    /// Stays armed until the cancel returns, so dropping this future mid-cancel
    /// still hands the cancel to `Drop`.
    async fn abandon(mut self) {
        cancel_quietly(&*self.transport, &self.export_id).await;
        self.armed = false;
    }
}

impl<T: Transport + 'static> Drop for ExportLease<T> {
    // Reached with `armed` set only when the owning future is dropped mid-flight.
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let export_id = self.export_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(export_id = %export_id, "export abandoned in flight; cancelling in background");
                let transport = self.transport.clone();
                handle.spawn(async move {
                    cancel_quietly(&*transport, &export_id).await;
                });
            }
            Err(_) => {
                warn!(export_id = %export_id, "export abandoned outside a runtime; job left on server");
            }
        }
    }
}

/// Client for the bulk activity export resource.
///
/// Holds no per-job state: one instance can drive any number of concurrent
/// exports over a shared transport.
pub struct BulkActivityExport<T: Transport + 'static> {
    transport: Arc<T>,
    retry: RetryExecutor,
}

impl<T: Transport + 'static> Clone for BulkActivityExport<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<T: Transport + 'static> BulkActivityExport<T> {
    /// Client with the default polling policy (10 retries, 30s up to 60s).
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            retry: RetryExecutor::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Create an export job. The job does nothing until enqueued.
    pub async fn create(&self, request: &ActivityExportRequest) -> Result<ExportJob, ExportError> {
        let envelope = send(&*self.transport, Operation::Create(request)).await?;
        expect_job("create", envelope)
    }

    /// Put a created job in the server's processing queue.
    pub async fn enqueue(&self, export_id: &ExportId) -> Result<Option<ExportJob>, ExportError> {
        let envelope = send(&*self.transport, Operation::Enqueue(export_id)).await?;
        expect_success("enqueue", envelope)
    }

    /// One status check.
    pub async fn status(&self, export_id: &ExportId) -> Result<ExportJob, ExportError> {
        let envelope = send(&*self.transport, Operation::Status(export_id)).await?;
        expect_job("status", envelope)
    }

    pub async fn cancel(&self, export_id: &ExportId) -> Result<Option<ExportJob>, ExportError> {
        let envelope = send(&*self.transport, Operation::Cancel(export_id)).await?;
        expect_success("cancel", envelope)
    }

    /// Poll status until the job leaves `Queued`/`Processing`.
    ///
    /// Returns the terminal status record. A server-side `Failed` or
    /// `Cancelled` job is terminal too and is returned, not raised.
    pub async fn status_until_completed(
        &self,
        export_id: &ExportId,
        cancel: &CancellationToken,
    ) -> Result<ExportJob, ExportError> {
        let transport = &*self.transport;

        let outcome = self
            .retry
            .run(cancel, |attempt| async move {
                let envelope = match send(transport, Operation::Status(export_id)).await {
                    Ok(envelope) => envelope,
                    Err(e) => return Attempt::Fatal(ExportError::from(e)),
                };
                let request_id = envelope.request_id.clone();

                match expect_job("status", envelope) {
                    Err(e) => Attempt::Fatal(e),
                    Ok(job) if job.status.is_running() => {
                        debug!(export_id = %export_id, attempt, status = %job.status, "export still running");
                        Attempt::StillRunning(PollHint {
                            request_id,
                            status: job.status,
                        })
                    }
                    Ok(job) => Attempt::Ready(job),
                }
            })
            .await;

        match outcome {
            Ok(job) => {
                if job.status == ExportStatus::Completed {
                    info!(export_id = %export_id, records = ?job.number_of_records, "export completed");
                } else {
                    warn!(export_id = %export_id, status = %job.status, error = ?job.error_msg, "export ended without completing");
                }
                Ok(job)
            }
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => Err(ExportError::StillRunning {
                export_id: export_id.clone(),
                attempts,
                last_status: last.status,
                request_id: last.request_id,
            }),
            Err(RetryError::Cancelled { attempts }) => {
                debug!(export_id = %export_id, attempts, "status polling cancelled");
                Err(ExportError::Cancelled {
                    export_id: export_id.clone(),
                })
            }
        }
    }

    /// Create, enqueue and wait for an export; returns its id once terminal.
    ///
    /// If anything fails after the job was created (including the caller
    /// cancelling `cancel`), the job is cancelled before the original error is
    /// returned. A failing cancel is logged and never replaces that error.
    pub async fn queue_and_wait_until_complete(
        &self,
        request: &ActivityExportRequest,
        cancel: &CancellationToken,
    ) -> Result<ExportId, ExportError> {
        let created = self.create(request).await?;
        info!(export_id = %created.export_id, "export job created");

        let lease = ExportLease::acquire(self.transport.clone(), created.export_id);
        match self.enqueue_and_wait(lease.export_id(), cancel).await {
            Ok(_) => Ok(lease.release()),
            Err(err) => {
                warn!(export_id = %lease.export_id(), error = %err, "export failed; cancelling job");
                lease.abandon().await;
                Err(err)
            }
        }
    }

    async fn enqueue_and_wait(
        &self,
        export_id: &ExportId,
        cancel: &CancellationToken,
    ) -> Result<ExportJob, ExportError> {
        self.enqueue(export_id).await?;
        debug!(export_id = %export_id, "export job enqueued");
        self.status_until_completed(export_id, cancel).await
    }

    /// Download the export file as text. Not compensated: a failed download
    /// leaves the job as is.
    pub async fn file(&self, export_id: &ExportId) -> Result<String, ExportError> {
        let text = self
            .transport
            .get_text(&job_path(export_id, "file.json"), &[])
            .await?;

        if let Some(failure) = embedded_failure(&text) {
            log_failure("file", &failure);
            return Err(failure.into());
        }
        Ok(text)
    }

    /// Download the file and map each data row with `map`.
    pub async fn trans_file<R, F>(
        &self,
        export_id: &ExportId,
        format: ExportFormat,
        map: F,
    ) -> Result<ExportRows<F>, ExportError>
    where
        F: FnMut(&StringRecord) -> R,
    {
        let text = self.file(export_id).await?;
        Ok(rows::map_rows(text, format, map)?)
    }

    /// Download the file and deserialize each data row by header name.
    pub async fn trans_file_as<R: DeserializeOwned>(
        &self,
        export_id: &ExportId,
        format: ExportFormat,
    ) -> Result<csv::DeserializeRecordsIntoIter<Cursor<String>, R>, ExportError> {
        let text = self.file(export_id).await?;
        Ok(rows::deserialize_rows(text, format))
    }
}
