use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::time::Duration;

/// Summary of a finished upload
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub url: String,
    pub status: u16,
    pub bytes_sent: u64,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TransferReport {
    pub fn new(url: impl Into<String>, status: u16, bytes_sent: u64, elapsed: Duration) -> Self {
        Self {
            url: url.into(),
            status,
            bytes_sent,
            duration_ms: elapsed.as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

/// Response handed back by a [`Transport`](super::Transport)
///
/// The body, when present, is read at most once by the coordinator and
/// dropped before the outcome is settled.
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<Box<dyn Read + Send>>,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("body", &self.body.is_some())
            .finish()
    }
}

impl TransportResponse {
    /// A response without a body
    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Attach a body
    pub fn with_body<R: Read + Send + 'static>(mut self, body: R) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// Whether the status is in the 2xx class
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
