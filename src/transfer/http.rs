//! HTTP transport backed by `reqwest`
//!
//! The pipe reader is pumped on its own thread into a small channel that
//! feeds a chunked, single-pass request body. The request runs on a runtime
//! owned by the transport, so the calling thread only blocks on the result.
//!
//! The read timeout is an idle timeout: it only counts time during which the
//! network is expected to make progress (data waiting in the pipe, or the
//! body finished and the response pending) and none is made. A slow writer
//! never trips it.

use super::types::TransportResponse;
use crate::error::{BoxError, Result, StreamifyError};
use crate::pipe::{PipeControl, PipeReader, PipeStats};
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, RequestBuilder};
use std::future::Future;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use url::Url;

const PUMP_NAME: &str = "streamify-body";
const BODY_CHUNK_SIZE: usize = 64 * 1024;
const BODY_CHANNEL_DEPTH: usize = 4;

/// Seam between the coordinator and the HTTP client
pub trait Transport: Send + Sync {
    /// Issue one PUT streaming `body`, blocking until the response has arrived
    fn put(
        &self,
        url: &Url,
        content_type: &str,
        body: PipeReader,
    ) -> std::result::Result<TransportResponse, BoxError>;
}

/// Per-request hook applied to every outgoing request
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Runtime shared by every request of a transport
///
/// Shut down in the background on drop so the last handle may be released
/// from any context.
struct TransportRuntime(Option<Runtime>);

impl TransportRuntime {
    fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("streamify-http")
            .enable_all()
            .build()?;
        Ok(Self(Some(runtime)))
    }

    fn get(&self) -> io::Result<&Runtime> {
        self.0
            .as_ref()
            .ok_or_else(|| io::Error::other("transport runtime has been shut down"))
    }
}

impl Drop for TransportRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// [`Transport`] over a shared `reqwest::Client`
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    runtime: Arc<TransportRuntime>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("interceptors", &self.interceptors.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl HttpTransport {
    /// Wrap an already configured client; no idle timeout is enforced
    pub fn new(client: Client) -> Result<Self> {
        Ok(Self {
            client,
            runtime: Arc::new(TransportRuntime::new()?),
            interceptors: Vec::new(),
            idle_timeout: None,
        })
    }

    /// Build a client with the given connect timeout and idle read timeout
    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let runtime = TransportRuntime::new()?;
        let client = {
            let _entered = runtime.get()?.enter();
            Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|e| {
                    StreamifyError::config_error(format!("Failed to build HTTP client: {}", e))
                })?
        };

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
            interceptors: Vec::new(),
            idle_timeout: Some(read_timeout),
        })
    }

    /// Register an interceptor; interceptors run in registration order
    pub fn interceptor<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

impl Transport for HttpTransport {
    fn put(
        &self,
        url: &Url,
        content_type: &str,
        body: PipeReader,
    ) -> std::result::Result<TransportResponse, BoxError> {
        let runtime = self.runtime.get()?;
        let control = body.control();

        let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        thread::Builder::new()
            .name(PUMP_NAME.to_string())
            .spawn(move || pump_body(body, tx))?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });

        let mut request = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(Body::wrap_stream(stream));
        for interceptor in &self.interceptors {
            request = interceptor.intercept(request);
        }

        let idle_timeout = self.idle_timeout;
        runtime.block_on(async move {
            let response = watch_progress(request.send(), &control, idle_timeout).await?;
            let status = response.status().as_u16();
            debug!("PUT {} answered {}", url, status);

            let mut out = TransportResponse::new(status);
            if response.content_length() == Some(0) {
                return Ok(out);
            }

            let bytes: std::result::Result<_, BoxError> = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, response.bytes()).await {
                    Ok(read) => read.map_err(Into::into),
                    Err(_) => Err(Box::new(io::Error::from(io::ErrorKind::TimedOut))),
                },
                None => response.bytes().await.map_err(Into::into),
            };
            match bytes {
                Ok(bytes) => out = out.with_body(io::Cursor::new(bytes)),
                Err(e) => warn!("Failed to read response body from '{}': {}", url, e),
            }
            Ok::<TransportResponse, BoxError>(out)
        })
    }
}

/// Move bytes from the pipe into the request body channel
///
/// Ends when the pipe ends, fails, or the request stops consuming the body.
fn pump_body(mut body: PipeReader, tx: mpsc::Sender<io::Result<Vec<u8>>>) {
    let mut buf = vec![0u8; BODY_CHUNK_SIZE];
    loop {
        match body.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

/// Drive `request`, failing it once the transfer stays idle for `limit`
async fn watch_progress<F, T, E>(
    request: F,
    control: &PipeControl,
    limit: Option<Duration>,
) -> std::result::Result<T, BoxError>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    let Some(limit) = limit else {
        return request.await.map_err(Into::into);
    };

    tokio::pin!(request);
    let mut tracker = IdleTracker::new(limit, control.stats(), Instant::now());
    let mut ticker = tokio::time::interval(tick_for(limit));

    loop {
        tokio::select! {
            result = &mut request => return result.map_err(Into::into),
            _ = ticker.tick() => {
                if tracker.observe(&control.stats(), Instant::now()) {
                    return Err(Box::new(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no upload progress for {:?}", limit),
                    )));
                }
            }
        }
    }
}

fn tick_for(limit: Duration) -> Duration {
    (limit / 4).clamp(Duration::from_millis(10), Duration::from_millis(250))
}

/// Whether the transfer is waiting on the remote rather than on the writer
fn waiting_on_network(stats: &PipeStats) -> bool {
    stats.buffered > 0 || stats.ended
}

/// Measures how long a transfer has gone without network progress
struct IdleTracker {
    limit: Duration,
    last_bytes: u64,
    since: Instant,
}

impl IdleTracker {
    fn new(limit: Duration, stats: PipeStats, now: Instant) -> Self {
        Self {
            limit,
            last_bytes: stats.bytes_read,
            since: now,
        }
    }

    /// Record a sample; returns `true` once idle for at least the limit
    fn observe(&mut self, stats: &PipeStats, now: Instant) -> bool {
        if stats.bytes_read != self.last_bytes || !waiting_on_network(stats) {
            self.last_bytes = stats.bytes_read;
            self.since = now;
            return false;
        }
        now.duration_since(self.since) >= self.limit
    }
}
