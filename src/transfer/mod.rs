//! Transfer coordination for streamify
//!
//! The coordinator owns the single PUT of an upload. It runs on its own
//! worker thread from the moment a sink is opened, streams the pipe's reader
//! as the request body and settles the shared [`TransferOutcome`] exactly once.

pub mod auth;
pub mod http;
pub mod types;

pub use auth::BasicAuthInterceptor;
pub use http::{HttpTransport, RequestInterceptor, Transport};
pub use types::{TransferReport, TransportResponse};

use crate::error::TransferError;
use crate::outcome::{TransferOutcome, TransferResult};
use crate::pipe::{PipeControl, PipeReader};
use log::{error, info, warn};
use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use url::Url;

const WORKER_NAME: &str = "streamify-transfer";

/// Issues the upload request for one sink
pub struct TransferCoordinator {
    url: Url,
    content_type: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for TransferCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferCoordinator")
            .field("url", &self.url.as_str())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl TransferCoordinator {
    pub fn new(url: Url, content_type: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            url,
            content_type: content_type.into(),
            transport,
        }
    }

    /// Start the transfer on a worker thread, consuming `body`
    pub fn start(self, body: PipeReader) -> io::Result<TransferHandle> {
        let outcome = Arc::new(TransferOutcome::new());
        let url = self.url.to_string();

        let worker = thread::Builder::new().name(WORKER_NAME.to_string()).spawn({
            let outcome = outcome.clone();
            move || self.run(body, &outcome)
        })?;

        Ok(TransferHandle {
            url,
            outcome,
            worker: Some(worker),
        })
    }

    fn run(self, body: PipeReader, outcome: &TransferOutcome) {
        let control = body.control();
        let url = self.url.as_str();
        let _guard = SettleGuard {
            outcome,
            control: control.clone(),
            url,
        };

        info!("Uploading content to '{}'", url);
        let started = Instant::now();

        let result = match self.transport.put(&self.url, &self.content_type, body) {
            Ok(response) => settle_response(url, response),
            Err(source) => Err(TransferError::transport(url, source)),
        };

        let result = result.map(|status| {
            TransferReport::new(url, status, control.stats().bytes_read, started.elapsed())
        });

        match &result {
            Ok(report) => info!(
                "Completed upload to '{}': {} bytes in {} ms",
                url, report.bytes_sent, report.duration_ms
            ),
            Err(e) => {
                error!("{}", e);
                // A writer blocked on a full pipe would otherwise wait forever
                control.abort(io::ErrorKind::ConnectionAborted, e.to_string());
            }
        }

        outcome.settle(result);
    }
}

/// Turn a response into the upload status or a descriptive error
///
/// The body is consumed and dropped here on every path, success included,
/// so the underlying connection is always released.
pub fn settle_response(url: &str, response: TransportResponse) -> Result<u16, TransferError> {
    let success = response.is_success();
    let TransportResponse { status, body } = response;

    let details = body.map(|mut body| {
        let mut buf = Vec::new();
        match body.read_to_end(&mut buf) {
            Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
            Err(e) => {
                warn!("Failed to read response body from '{}': {}", url, e);
                String::new()
            }
        }
    });

    if success {
        Ok(status)
    } else {
        Err(TransferError::status(url, status, details))
    }
}

/// Settles the outcome as abandoned if the worker unwinds before settling
struct SettleGuard<'a> {
    outcome: &'a TransferOutcome,
    control: PipeControl,
    url: &'a str,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.outcome.is_settled() {
            let err = TransferError::abandoned(self.url);
            self.control
                .abort(io::ErrorKind::ConnectionAborted, err.to_string());
            self.outcome.settle(Err(err));
        }
    }
}

/// Handle on a running transfer
#[derive(Debug)]
pub struct TransferHandle {
    url: String,
    outcome: Arc<TransferOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl TransferHandle {
    /// Destination of the transfer
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the outcome has been settled
    pub fn is_settled(&self) -> bool {
        self.outcome.is_settled()
    }

    /// Block until the transfer settles, then reap the worker thread
    pub fn wait(&mut self) -> TransferResult {
        let result = self
            .outcome
            .wait()
            .unwrap_or_else(|| Err(TransferError::abandoned(self.url.clone())));

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Transfer worker for '{}' panicked", self.url);
            }
        }

        result
    }
}
