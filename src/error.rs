//! Error handling for streamify
//!
//! This module defines the error types used throughout the library.
//! Transfer failures are captured on the worker thread as [`TransferError`]
//! and surfaced to the caller wrapped in [`StreamifyError`] when the sink
//! is closed.

use std::io;
use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StreamifyError>;

/// Boxed error produced by a transport or an upstream element source
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Placeholder used in status errors when the response carried no body
pub const NO_BODY_PLACEHOLDER: &str = "NA";

/// Failure of the network transfer behind a sink
#[derive(Error, Debug)]
pub enum TransferError {
    /// The HTTP exchange failed before a response was received
    #[error("Failed to stream to '{url}': {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The remote answered with a non-success status
    #[error("Failed to stream to '{url}' because error code {status} received! Details: {details}")]
    Status {
        url: String,
        status: u16,
        details: String,
    },

    /// The transfer worker exited without producing a result
    #[error("Transfer to '{url}' ended without a result")]
    Abandoned { url: String },
}

impl TransferError {
    /// Create a new transport error
    pub fn transport(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        TransferError::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Create a new status error; an empty body is reported as [`NO_BODY_PLACEHOLDER`]
    pub fn status(url: impl Into<String>, status: u16, body: Option<String>) -> Self {
        let details = match body {
            Some(body) if !body.is_empty() => body,
            _ => NO_BODY_PLACEHOLDER.to_string(),
        };
        TransferError::Status {
            url: url.into(),
            status,
            details,
        }
    }

    /// Create a new abandoned error
    pub fn abandoned(url: impl Into<String>) -> Self {
        TransferError::Abandoned { url: url.into() }
    }

    /// The destination this transfer was aimed at
    pub fn url(&self) -> &str {
        match self {
            TransferError::Transport { url, .. }
            | TransferError::Status { url, .. }
            | TransferError::Abandoned { url } => url,
        }
    }

    /// The HTTP status if the remote answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransferError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Error types that can occur when using streamify
#[derive(Error, Debug)]
pub enum StreamifyError {
    /// Channel or request configuration is unusable
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid parameter
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// The upload failed; `suppressed` holds a release failure seen on the way out
    #[error("{source}")]
    Transfer {
        #[source]
        source: TransferError,
        suppressed: Option<Box<StreamifyError>>,
    },

    /// An upstream element could not be produced or encoded
    #[error("Failed to process stream element #{index}: {source}")]
    Element {
        index: u64,
        #[source]
        source: BoxError,
    },

    /// Releasing a resource (transform layer, pipe) failed
    #[error("Failed to release {resource}: {source}")]
    ResourceRelease {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// The sink no longer accepts writes
    #[error("Sink is closed")]
    SinkClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StreamifyError {
    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        StreamifyError::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        StreamifyError::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new element error
    pub fn element(index: u64, source: impl Into<BoxError>) -> Self {
        StreamifyError::Element {
            index,
            source: source.into(),
        }
    }

    /// Create a new resource release error
    pub fn resource_release(resource: impl Into<String>, source: io::Error) -> Self {
        StreamifyError::ResourceRelease {
            resource: resource.into(),
            source,
        }
    }

    /// Wrap a transfer error, attaching a release failure that happened alongside it
    pub fn transfer(source: TransferError, suppressed: Option<StreamifyError>) -> Self {
        StreamifyError::Transfer {
            source,
            suppressed: suppressed.map(Box::new),
        }
    }

    /// The secondary error attached to a transfer failure, if any
    pub fn suppressed(&self) -> Option<&StreamifyError> {
        match self {
            StreamifyError::Transfer { suppressed, .. } => suppressed.as_deref(),
            _ => None,
        }
    }

    /// The transfer error behind this error, if any
    pub fn as_transfer(&self) -> Option<&TransferError> {
        match self {
            StreamifyError::Transfer { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this error was raised synchronously by configuration checks
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            StreamifyError::ConfigError { .. } | StreamifyError::InvalidParameter { .. }
        )
    }

    /// Convert into an `io::Error` that keeps this error as its inner payload
    pub fn into_io(self) -> io::Error {
        match self {
            StreamifyError::Io(e) => e,
            StreamifyError::SinkClosed => io::Error::new(io::ErrorKind::BrokenPipe, self),
            other => io::Error::other(other),
        }
    }

    /// Recover a `StreamifyError` carried inside an `io::Error`
    pub fn from_io_ref(err: &io::Error) -> Option<&StreamifyError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<StreamifyError>())
    }
}
