//! End-to-end uploads against an in-process HTTP server

mod common;

use common::{payload, refused_base_url, TestServer};
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};
use streamify::{
    upload_reader, ChannelConfig, SinkState, StreamifyError, StreamingChannel, StreamingRequest,
    TransferError, WebDavChannel, JSON_LINES_CONTENT_TYPE,
};

fn channel(server: &TestServer) -> WebDavChannel {
    WebDavChannel::new(ChannelConfig::new(server.base_url())).unwrap()
}

#[test]
fn test_round_trip_sizes() {
    let _ = env_logger::try_init();
    let server = TestServer::start();
    let channel = channel(&server);

    for (i, size) in [1usize, 1000, 64 * 1024, 3 * 1024 * 1024 + 17].into_iter().enumerate() {
        let data = payload(size);
        let identifier = format!("sizes/{}.bin", i);
        let request = StreamingRequest::new(identifier.clone(), "application/octet-stream")
            .buffer_size(8 * 1024);

        let mut sink = channel.open(&request, &identifier).unwrap();
        for chunk in data.chunks(1500) {
            sink.write_all(chunk).unwrap();
        }
        let report = sink.close().unwrap();

        assert_eq!(report.status, 201);
        assert_eq!(report.bytes_sent, size as u64);
        let received = server.upload(&identifier).unwrap();
        assert_eq!(received.body.len(), size);
        assert!(received.body == data, "payload of {} bytes corrupted", size);
    }
}

#[test]
fn test_empty_upload() {
    let server = TestServer::start();
    let channel = channel(&server);

    let mut sink = channel
        .open(&StreamingRequest::json_lines(), "empty.jsonl")
        .unwrap();
    let report = sink.close().unwrap();

    assert_eq!(report.bytes_sent, 0);
    let received = server.upload("empty.jsonl").unwrap();
    assert!(received.body.is_empty());
    assert_eq!(received.content_type.as_deref(), Some(JSON_LINES_CONTENT_TYPE));
}

#[test]
fn test_tiny_buffer_streams_large_payload() {
    let server = TestServer::start();
    let channel = channel(&server);
    let data = payload(20_000);

    let mut sink = channel
        .open(
            &StreamingRequest::new("tiny", "text/plain").buffer_size(1),
            "tiny/buffer.txt",
        )
        .unwrap();
    sink.write_all(&data).unwrap();
    assert!(sink.pipe_stats().capacity == 1);
    sink.close().unwrap();

    assert_eq!(server.upload("tiny/buffer.txt").unwrap().body, data);
}

#[test]
fn test_not_found_with_body() {
    let server = TestServer::start();
    let channel = channel(&server);

    let mut sink = channel
        .open(&StreamingRequest::json_lines(), "missing/rows.jsonl")
        .unwrap();
    sink.write_all(b"{\"a\":1}\n").unwrap();
    let err = sink.close().unwrap_err();

    let url = format!("{}/missing/rows.jsonl", server.base_url());
    assert_eq!(
        err.to_string(),
        format!(
            "Failed to stream to '{}' because error code 404 received! Details: some_content",
            url
        )
    );
    assert_eq!(err.as_transfer().unwrap().status_code(), Some(404));
    assert_eq!(sink.state(), SinkState::Closed);
}

#[test]
fn test_unauthorized_without_body() {
    let server = TestServer::start();
    let channel = channel(&server);

    let mut sink = channel
        .open(&StreamingRequest::json_lines(), "denied/rows.jsonl")
        .unwrap();
    sink.write_all(b"{}\n").unwrap();
    let err = sink.close().unwrap_err();

    assert!(err.to_string().contains("error code 401 received! Details: NA"));
}

#[test]
fn test_connection_refused() {
    let channel = WebDavChannel::new(ChannelConfig::new(refused_base_url())).unwrap();

    let mut sink = channel
        .open(&StreamingRequest::json_lines().buffer_size(64), "rows.jsonl")
        .unwrap();

    // The failure may surface on a write once the pipe is aborted, or only at close
    let mut write_error = None;
    for _ in 0..1000 {
        if let Err(e) = sink.write_all(&[b'x'; 64]) {
            write_error = Some(e);
            break;
        }
    }
    if let Some(e) = write_error {
        assert_ne!(e.kind(), io::ErrorKind::WouldBlock);
    }

    let err = sink.close().unwrap_err();
    assert!(matches!(
        err.as_transfer(),
        Some(TransferError::Transport { .. })
    ));
    assert!(sink.pipe_stats().reader_released);
}

#[test]
fn test_basic_auth_header_is_sent() {
    let server = TestServer::start();
    let config = ChannelConfig::new(server.base_url()).credentials("user", "pass");
    let channel = WebDavChannel::new(config).unwrap();

    let report = upload_reader(
        &channel,
        &StreamingRequest::new("auth", "text/plain"),
        "auth/file.txt",
        &b"secret data"[..],
    )
    .unwrap();

    assert_eq!(report.status, 201);
    let received = server.upload("auth/file.txt").unwrap();
    assert_eq!(received.authorization.as_deref(), Some("Basic dXNlcjpwYXNz"));
    assert_eq!(received.body, b"secret data");
}

#[test]
fn test_no_auth_header_without_credentials() {
    let server = TestServer::start();
    let channel = channel(&server);

    upload_reader(
        &channel,
        &StreamingRequest::new("anon", "text/plain"),
        "anon.txt",
        &b"hi"[..],
    )
    .unwrap();
    assert!(server.upload("anon.txt").unwrap().authorization.is_none());
}

#[test]
fn test_identifier_normalization() {
    let server = TestServer::start();
    let channel =
        WebDavChannel::new(ChannelConfig::new(format!("{}/", server.base_url()))).unwrap();
    assert!(channel.base_url().ends_with("/dav/"));

    let mut sink = channel
        .open(&StreamingRequest::json_lines(), "///nested/dir/file.jsonl")
        .unwrap();
    sink.write_all(b"{}\n").unwrap();
    sink.close().unwrap();

    assert!(server.upload("nested/dir/file.jsonl").is_some());
}

#[test]
fn test_write_after_close() {
    let server = TestServer::start();
    let channel = channel(&server);

    let mut sink = channel
        .open(&StreamingRequest::json_lines(), "closed.jsonl")
        .unwrap();
    sink.close().unwrap();

    let err = sink.write_all(b"late").unwrap_err();
    assert!(matches!(
        StreamifyError::from_io_ref(&err),
        Some(StreamifyError::SinkClosed)
    ));
    assert!(matches!(sink.close(), Err(StreamifyError::SinkClosed)));
    assert_eq!(server.upload("closed.jsonl").unwrap().body.len(), 0);
}

#[test]
fn test_sequential_sinks_on_one_channel() {
    let server = TestServer::start();
    let channel = channel(&server);

    for i in 0..5 {
        let identifier = format!("batch/{}.txt", i);
        let mut sink = channel
            .open(&StreamingRequest::new("batch", "text/plain"), &identifier)
            .unwrap();
        write!(sink, "file number {}", i).unwrap();
        sink.close().unwrap();
    }

    assert_eq!(server.upload_count(), 5);
    assert_eq!(server.upload("batch/3.txt").unwrap().body, b"file number 3");
}

#[test]
fn test_concurrent_sinks() {
    let server = TestServer::start();
    let channel = channel(&server);

    std::thread::scope(|scope| {
        for i in 0..4 {
            let channel = channel.clone();
            scope.spawn(move || {
                let identifier = format!("parallel/{}.bin", i);
                let data = payload(100_000 + i);
                let mut sink = channel
                    .open(
                        &StreamingRequest::new("p", "application/octet-stream").buffer_size(4096),
                        &identifier,
                    )
                    .unwrap();
                sink.write_all(&data).unwrap();
                sink.close().unwrap();
            });
        }
    });

    for i in 0..4 {
        let received = server.upload(&format!("parallel/{}.bin", i)).unwrap();
        assert_eq!(received.body, payload(100_000 + i));
    }
}

#[test]
fn test_invalid_configuration_fails_synchronously() {
    assert!(WebDavChannel::new(ChannelConfig::new("")).unwrap_err().is_config());
    assert!(WebDavChannel::new(ChannelConfig::new("ftp://example.com/"))
        .unwrap_err()
        .is_config());

    let server = TestServer::start();
    let channel = channel(&server);
    assert!(channel
        .open(&StreamingRequest::json_lines(), "")
        .unwrap_err()
        .is_config());
    assert_eq!(server.upload_count(), 0);
}

#[test]
fn test_slow_writer_outlives_read_timeout() {
    let server = TestServer::start();
    let config = ChannelConfig::new(server.base_url()).read_timeout_secs(2);
    let channel = WebDavChannel::new(config).unwrap();

    let mut sink = channel
        .open(&StreamingRequest::new("slow", "text/plain"), "slow.txt")
        .unwrap();
    let started = Instant::now();
    // One byte every 250 ms: about 4 s in total, never idle for 2 s
    for _ in 0..16 {
        sink.write_all(b"x").unwrap();
        sink.flush().unwrap();
        thread::sleep(Duration::from_millis(250));
    }
    let report = sink.close().unwrap();

    assert!(started.elapsed() > Duration::from_secs(3));
    assert_eq!(report.bytes_sent, 16);
    assert_eq!(server.upload("slow.txt").unwrap().body, vec![b'x'; 16]);
}

#[test]
fn test_unresponsive_server_hits_read_timeout() {
    let server = TestServer::start();
    let config = ChannelConfig::new(server.base_url()).read_timeout_secs(1);
    let channel = WebDavChannel::new(config).unwrap();

    let mut sink = channel
        .open(&StreamingRequest::new("stall", "text/plain"), "stall/file.txt")
        .unwrap();
    sink.write_all(b"waiting for an answer").unwrap();

    let started = Instant::now();
    let err = sink.close().unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        err.as_transfer(),
        Some(TransferError::Transport { .. })
    ));
    assert!(err.to_string().contains("no upload progress"));
}
