use std::{
    error::Error,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use tokio::{
    io::{duplex, AsyncReadExt, AsyncWriteExt},
    time::timeout,
};

use crate::{
    config::{ListenerConfig, SecurityConfig, ServerConfig},
    errors::StoreError,
    renderer::LinkResolver,
    server::{
        conn::handler::{read_request_line, ConnectionHandler, RequestLine},
        context::RequestContext,
    },
    store::ContentStore,
    tests::support::{local, peer, wiki},
};

fn config() -> ServerConfig {
    ServerConfig::builder()
        .add_listener(ListenerConfig::default())
        .security(
            SecurityConfig::builder()
                .hostname("example.org")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

async fn exchange(handler: &ConnectionHandler, request: &[u8]) -> Vec<u8> {
    let (mut client, server) = duplex(64 * 1024);
    let (_, response) = tokio::join!(handler.serve(server, peer(), local()), async {
        client
            .write_all(request)
            .await
            .unwrap();
        client
            .shutdown()
            .await
            .unwrap();
        let mut response = Vec::new();
        client
            .read_to_end(&mut response)
            .await
            .unwrap();
        response
    });
    response
}

#[tokio::test]
async fn test_page() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"gemini://example.org/\r\n").await;
    let response = String::from_utf8(response)?;
    assert!(response.starts_with("20 text/gemini; lang=en\r\n# Welcome\n"));
    assert!(response.contains("=> //example.org/wiki:syntax [1] syntax guide\n"));
    Ok(())
}

#[tokio::test]
async fn test_links_keep_request_port() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"gemini://example.org:1966/start\r\n").await;
    let response = String::from_utf8(response)?;
    assert!(response.contains("=> //example.org:1966/wiki:syntax [1] syntax guide\n"));
    Ok(())
}

#[tokio::test]
async fn test_media() {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"gemini://example.org/_media/wiki/logo.png\r\n").await;
    let mut expected = b"20 image/png\r\n".to_vec();
    expected.extend_from_slice(b"\x89PNG\r\n\x1a\nlogo");
    assert_eq!(response, expected);
}

#[tokio::test]
async fn test_not_found() {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"gemini://example.org/nothing/here\r\n").await;
    assert_eq!(response, b"51 NOT FOUND\r\n");

    let response = exchange(&handler, b"gemini://example.org/_media/missing.png\r\n").await;
    assert_eq!(response, b"51 NOT FOUND\r\n");
}

#[tokio::test]
async fn test_rejected_requests() {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"gemini://example.org/../etc/passwd\r\n").await;
    assert_eq!(response, b"59 BAD URL\r\n");

    let response = exchange(&handler, b"https://example.org/\r\n").await;
    assert_eq!(response, b"59 BAD PROTOCOL\r\n");

    let response = exchange(&handler, b"\xff\xfe\r\n").await;
    assert_eq!(response, b"59 BAD REQUEST\r\n");
}

#[tokio::test]
async fn test_request_too_long() {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let mut request = b"gemini://example.org/".to_vec();
    request.extend(std::iter::repeat(b'a').take(2000));
    request.extend_from_slice(b"\r\n");

    let response = exchange(&handler, &request).await;
    assert_eq!(response, b"59 REQUEST TOO LONG\r\n");
}

#[tokio::test]
async fn test_silent_close_on_empty_connection() {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"").await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_broken_page_is_temporary_failure() {
    let (_dir, store) = wiki();
    let handler = ConnectionHandler::new(config(), Arc::new(store));

    let response = exchange(&handler, b"gemini://example.org/broken\r\n").await;
    assert_eq!(response, b"40 TEMPORARY FAILURE\r\n");
}

struct PanickingStore;

impl LinkResolver for PanickingStore {
    fn resolve_page(&self, _current: &str, _link: &str) -> Option<String> {
        None
    }

    fn resolve_media(&self, _current: &str, _src: &str) -> Option<String> {
        None
    }
}

impl ContentStore for PanickingStore {
    fn clean_id(&self, raw: &str) -> String {
        raw.trim_matches(':')
            .to_string()
    }

    fn page_exists(&self, _id: &str) -> bool {
        true
    }

    fn resolve_media_path(&self, _id: &str) -> Option<PathBuf> {
        None
    }

    fn render_page(&self, id: &str, _context: &RequestContext) -> Result<Bytes, StoreError> {
        panic!("cannot render {}", id)
    }
}

#[tokio::test]
async fn test_render_panic_is_temporary_failure() {
    let handler = ConnectionHandler::new(config(), Arc::new(PanickingStore));

    let response = exchange(&handler, b"gemini://example.org/page\r\n").await;
    assert_eq!(response, b"40 TEMPORARY FAILURE\r\n");
}

#[tokio::test]
async fn test_stalled_reader_times_out() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let config = ServerConfig::builder()
        .add_listener(ListenerConfig::default())
        .write_timeout(Duration::from_secs(1))
        .build()?;
    let handler = ConnectionHandler::new(config, Arc::new(store));

    // The pipe holds less than the response header and the client never reads.
    let (mut client, server) = duplex(16);
    client
        .write_all(b"/\r\n")
        .await?;

    let started = Instant::now();
    timeout(Duration::from_secs(5), handler.serve(server, peer(), local())).await?;
    assert!(started.elapsed() < Duration::from_secs(3));
    drop(client);
    Ok(())
}

#[tokio::test]
async fn test_read_request_line_bounds() -> Result<(), Box<dyn Error>> {
    let exact = format!("{}\r\n", "a".repeat(1024));
    let line = read_request_line(&mut exact.as_bytes(), 1024).await?;
    assert_eq!(line, RequestLine::Line(vec![b'a'; 1024]));

    let over = format!("{}\r\n", "a".repeat(1025));
    let line = read_request_line(&mut over.as_bytes(), 1024).await?;
    assert_eq!(line, RequestLine::TooLong);

    let unterminated = "a".repeat(4096);
    let line = read_request_line(&mut unterminated.as_bytes(), 1024).await?;
    assert_eq!(line, RequestLine::TooLong);

    let line = read_request_line(&mut "".as_bytes(), 1024).await?;
    assert_eq!(line, RequestLine::Eof);

    let line = read_request_line(&mut "gemini://example.org/".as_bytes(), 1024).await?;
    assert_eq!(line, RequestLine::Line(b"gemini://example.org/".to_vec()));

    let line = read_request_line(&mut "/bare\n".as_bytes(), 1024).await?;
    assert_eq!(line, RequestLine::Line(b"/bare".to_vec()));
    Ok(())
}
