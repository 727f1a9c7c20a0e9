//! Upload channels
//!
//! A channel turns a [`StreamingRequest`] plus an identifier into an open
//! [`StreamingSink`]. The transfer is already running when `open` returns.

pub mod config;

pub use config::ChannelConfig;

use crate::error::{Result, StreamifyError};
use crate::pipe::{self, resolve_capacity};
use crate::request::StreamingRequest;
use crate::sink::StreamingSink;
use crate::transfer::{BasicAuthInterceptor, HttpTransport, TransferCoordinator, TransferReport, Transport};
use bytesize::ByteSize;
use log::{debug, info};
use std::io::{self, Read};
use std::sync::Arc;
use url::Url;

/// Something that can open upload sinks
pub trait StreamingChannel {
    /// Open a sink uploading to `identifier`
    fn open(&self, request: &StreamingRequest, identifier: &str) -> Result<StreamingSink>;
}

/// Channel that PUTs every upload below a WebDAV base URL
#[derive(Clone)]
pub struct WebDavChannel {
    base_url: String,
    transport: Arc<dyn Transport>,
    default_buffer_size: usize,
}

impl std::fmt::Debug for WebDavChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavChannel")
            .field("base_url", &self.base_url)
            .field("default_buffer_size", &self.default_buffer_size)
            .finish()
    }
}

impl WebDavChannel {
    /// Build a channel with an HTTP client configured from `config`
    pub fn new(config: ChannelConfig) -> Result<Self> {
        config.validate()?;

        let mut transport =
            HttpTransport::with_timeouts(config.connect_timeout(), config.read_timeout())?;
        if config.has_credentials() {
            let username = config.username.as_deref().unwrap_or_default();
            let password = config.password.as_deref().unwrap_or_default();
            transport = transport.interceptor(BasicAuthInterceptor::new(username, password)?);
        }

        let mut channel = Self::with_transport(&config.base_url, Arc::new(transport))?;
        channel.default_buffer_size = config.default_buffer_size;
        info!(
            "WebDAV channel ready at '{}' (auth: {})",
            channel.base_url,
            config.has_credentials()
        );
        Ok(channel)
    }

    /// Build a channel over an arbitrary transport
    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        if base_url.is_empty() {
            return Err(StreamifyError::config_error("Missing base URL!"));
        }
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Url::parse(&base_url).map_err(|e| {
            StreamifyError::config_error(format!("Invalid base URL '{}': {}", base_url, e))
        })?;

        Ok(Self {
            base_url,
            transport,
            default_buffer_size: pipe::DEFAULT_BUFFER_SIZE,
        })
    }

    /// Base URL, always ending with `/`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_buffer_size(&self) -> usize {
        self.default_buffer_size
    }

    /// Destination URL of `identifier`; leading slashes are ignored
    pub fn resolve_url(&self, identifier: &str) -> Result<Url> {
        let relative = identifier.trim_start_matches('/');
        if relative.is_empty() {
            return Err(StreamifyError::invalid_parameter(
                "identifier",
                "Missing identifier!",
            ));
        }

        let target = format!("{}{}", self.base_url, relative);
        Url::parse(&target).map_err(|e| {
            StreamifyError::config_error(format!("Invalid upload URL '{}': {}", target, e))
        })
    }

    fn buffer_size_for(&self, request: &StreamingRequest) -> usize {
        match request.buffer_size {
            Some(size) if size > 0 => size,
            _ => resolve_capacity(Some(self.default_buffer_size)),
        }
    }
}

impl StreamingChannel for WebDavChannel {
    fn open(&self, request: &StreamingRequest, identifier: &str) -> Result<StreamingSink> {
        request.validate()?;
        let url = self.resolve_url(identifier)?;
        let capacity = self.buffer_size_for(request);

        debug!(
            "Opening sink for '{}' (request {}, buffer {}, transforms {:?})",
            url,
            request.id,
            ByteSize::b(capacity as u64),
            request.transforms.names()
        );

        let (writer, reader) = pipe::bounded(capacity);
        let control = writer.control();

        // Started first: transforms may write headers into the pipe while wrapping
        let mut transfer =
            TransferCoordinator::new(url, request.content_type.clone(), self.transport.clone())
                .start(reader)?;

        match request.transforms.apply(Box::new(writer)) {
            Ok(top) => Ok(StreamingSink::new(top, control, transfer)),
            Err(e) => {
                control.abort(e.kind(), format!("failed to set up transforms: {}", e));
                // The aborted transfer settles promptly; reap its worker before returning
                let _ = transfer.wait();
                control.release_reader();
                Err(StreamifyError::Io(e))
            }
        }
    }
}

/// Open a sink, copy `reader` into it and close it
///
/// A copy failure caused by the transfer itself is reported as that
/// transfer failure rather than as the write error that exposed it.
pub fn upload_reader<C, R>(
    channel: &C,
    request: &StreamingRequest,
    identifier: &str,
    mut reader: R,
) -> Result<TransferReport>
where
    C: StreamingChannel + ?Sized,
    R: Read,
{
    let mut sink = channel.open(request, identifier)?;
    match io::copy(&mut reader, &mut sink) {
        Ok(_) => sink.close(),
        Err(copy_err) => match sink.close() {
            Err(close_err @ StreamifyError::Transfer { .. }) => Err(close_err),
            _ => Err(StreamifyError::Io(copy_err)),
        },
    }
}
