//! Test doubles for the job lifecycle: a scripted transport and sleepers.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use marketo_core::{ApiResponse, ExportJob, ExportStatus};

use crate::jobs::retry::Sleeper;
use crate::transport::{Query, Transport, TransportError};

/// One recorded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<JsonValue>,
}

#[derive(Debug, Clone)]
enum Reply {
    Json(JsonValue),
    Text(String),
    HttpStatus(u16),
}

/// Transport that replays canned replies per action (`create.json`,
/// `status.json`, ...). The last reply for an action repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, action: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn reply<R: Serialize>(self, action: &str, envelope: ApiResponse<R>) -> Self {
        self.push(action, Reply::Json(serde_json::to_value(envelope).unwrap()));
        self
    }

    pub fn reply_job(self, action: &str, id: &str, status: ExportStatus) -> Self {
        self.reply(action, ApiResponse::ok(vec![ExportJob::new(id, status)]))
    }

    pub fn reply_failure(self, action: &str, code: u32, message: &str) -> Self {
        self.reply(action, ApiResponse::<ExportJob>::failed(Some(code), message))
    }

    pub fn reply_text(self, action: &str, text: &str) -> Self {
        self.push(action, Reply::Text(text.to_string()));
        self
    }

    pub fn reply_http_status(self, action: &str, status: u16) -> Self {
        self.push(action, Reply::HttpStatus(status));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests whose path ends with `action`.
    pub fn count(&self, action: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path.ends_with(action))
            .count()
    }

    fn next(&self, method: &'static str, path: &str, body: Option<JsonValue>) -> Result<Reply, TransportError> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body,
        });

        let action = path.rsplit('/').next().unwrap_or_default();
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(action).ok_or_else(|| TransportError::Status {
            status: 404,
            path: path.to_string(),
            body: "no scripted reply".to_string(),
        })?;

        let reply = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        };

        match reply {
            Reply::HttpStatus(status) => Err(TransportError::Status {
                status,
                path: path.to_string(),
                body: String::new(),
            }),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, path: &str, _query: Query<'_>) -> Result<JsonValue, TransportError> {
        match self.next("GET", path, None)? {
            Reply::Json(value) => Ok(value),
            Reply::Text(text) => Ok(JsonValue::String(text)),
            Reply::HttpStatus(_) => unreachable!(),
        }
    }

    async fn post(&self, path: &str, body: &JsonValue) -> Result<JsonValue, TransportError> {
        match self.next("POST", path, Some(body.clone()))? {
            Reply::Json(value) => Ok(value),
            Reply::Text(text) => Ok(JsonValue::String(text)),
            Reply::HttpStatus(_) => unreachable!(),
        }
    }

    async fn get_text(&self, path: &str, _query: Query<'_>) -> Result<String, TransportError> {
        match self.next("GET", path, None)? {
            Reply::Json(value) => Ok(value.to_string()),
            Reply::Text(text) => Ok(text),
            Reply::HttpStatus(_) => unreachable!(),
        }
    }
}

/// Sleeper that returns immediately and records requested delays.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.calls.lock().unwrap().push(delay);
    }
}

/// Sleeper that never wakes up; only cancellation ends the wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingSleeper;

#[async_trait]
impl Sleeper for PendingSleeper {
    async fn sleep(&self, _delay: Duration) {
        std::future::pending::<()>().await;
    }
}
