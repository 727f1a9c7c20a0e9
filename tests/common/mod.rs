//! In-process WebDAV stand-in used by the integration tests
//!
//! The server runs on its own tokio runtime so the sinks under test are
//! always driven from plain threads.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// One request as the server saw it
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

type Uploads = Arc<Mutex<HashMap<String, ReceivedUpload>>>;

/// Answers `PUT /dav/{path}`:
/// - `missing/...` with 404 and body `some_content`
/// - `denied/...` with 401 and no body
/// - `stall/...` by reading the body and then not answering for 30 seconds
/// - anything else with 201, recording the upload
pub struct TestServer {
    base_url: String,
    uploads: Uploads,
    shutdown: Option<oneshot::Sender<()>>,
    runtime: Option<Runtime>,
}

impl TestServer {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let uploads: Uploads = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .route("/dav/{*path}", put(put_endpoint))
            .layer(DefaultBodyLimit::disable())
            .with_state(uploads.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}/dav", addr.port()),
            uploads,
            shutdown: Some(shutdown_tx),
            runtime: Some(runtime),
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn upload(&self, path: &str) -> Option<ReceivedUpload> {
        self.uploads.lock().unwrap().get(path).cloned()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn put_endpoint(
    State(uploads): State<Uploads>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if path.starts_with("missing/") {
        return (StatusCode::NOT_FOUND, "some_content").into_response();
    }
    if path.starts_with("denied/") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if path.starts_with("stall/") {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    }

    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let upload = ReceivedUpload {
        content_type: text(header::CONTENT_TYPE),
        authorization: text(header::AUTHORIZATION),
        body: body.to_vec(),
    };
    uploads.lock().unwrap().insert(path, upload);

    StatusCode::CREATED.into_response()
}

/// A URL on which nothing is listening
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/dav", port)
}

/// Deterministic, non-repeating-looking payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 7) % 251) as u8).collect()
}
