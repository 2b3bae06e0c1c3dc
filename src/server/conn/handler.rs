//! One Gemini exchange per connection.
//!
//! The handler walks every connection through [`ConnectionState`]: TLS
//! handshake, reading the single request line, resolving it against the
//! content store, writing the response and closing. Resolution and
//! rendering run on the blocking pool; a failure there is answered with
//! `40` instead of taking the connection task down.

use std::{
    fmt,
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::SystemTime,
};

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_rustls::TlsAcceptor;

use crate::{
    config::ServerConfig,
    errors::StoreError,
    server::{
        context::RequestContext,
        path::{PathResolver, ResourceKind},
        request::{GeminiRequest, RequestError},
        response::Response,
    },
    store::{ContentStore, MediaType},
    utils::date::format_timestamp,
};

const READ_CHUNK: usize = 512;

/// Lifecycle of a connection. Transitions only move forward; any error
/// jumps straight to `Closed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Accepted,
    Handshaking,
    ReadingRequest,
    Resolving,
    Writing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::ReadingRequest => "reading request",
            ConnectionState::Resolving => "resolving",
            ConnectionState::Writing => "writing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks the state of a single connection for logging.
struct Connection {
    peer: SocketAddr,
    state: ConnectionState,
}

impl Connection {
    fn new(peer: SocketAddr) -> Self {
        Connection { peer, state: ConnectionState::Accepted }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!("{}: {} -> {}", self.peer, self.state, next);
        self.state = next;
    }
}

/// Result of reading the request line.
#[derive(Debug, PartialEq)]
pub(crate) enum RequestLine {
    /// Line content without its terminator
    Line(Vec<u8>),
    /// The peer closed the connection before sending anything
    Eof,
    TooLong,
}

/// What a classified request turned out to be.
enum Resolved {
    Page(Bytes),
    Media(PathBuf, MediaType),
    Missing,
}

pub struct ConnectionHandler {
    config: ServerConfig,
    store: Arc<dyn ContentStore>,
    resolver: PathResolver,
    page_mime: String,
}

impl ConnectionHandler {
    pub fn new(config: ServerConfig, store: Arc<dyn ContentStore>) -> Self {
        let resolver = PathResolver::new(config.media_prefix());
        let page_mime = config.page_mime();
        ConnectionHandler { config, store, resolver, page_mime }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Terminates TLS on an accepted socket and serves one request.
    ///
    /// Never fails: every problem is either answered on the wire or logged.
    pub async fn handle(&self, acceptor: &TlsAcceptor, stream: TcpStream, peer: SocketAddr) {
        let mut connection = Connection::new(peer);

        let local = match stream.local_addr() {
            Ok(local) => local,
            Err(e) => {
                warn!("Cannot read local address for {}: {}", peer, e);
                connection.transition(ConnectionState::Closed);
                return;
            }
        };

        connection.transition(ConnectionState::Handshaking);
        let tls_stream = match timeout(
            self.config
                .handshake_timeout(),
            acceptor.accept(stream),
        )
        .await
        {
            Ok(Ok(tls_stream)) => tls_stream,
            Ok(Err(e)) => {
                warn!("TLS handshake with {} failed: {}", peer, e);
                connection.transition(ConnectionState::Closed);
                return;
            }
            Err(_) => {
                warn!("TLS handshake with {} timed out", peer);
                connection.transition(ConnectionState::Closed);
                return;
            }
        };

        self.exchange(&mut connection, tls_stream, local)
            .await;
    }

    /// Serves one request over an established stream.
    pub async fn serve<S>(&self, stream: S, peer: SocketAddr, local: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut connection = Connection::new(peer);
        self.exchange(&mut connection, stream, local)
            .await;
    }

    async fn exchange<S>(&self, connection: &mut Connection, mut stream: S, local: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = connection.peer;

        connection.transition(ConnectionState::ReadingRequest);
        let line = timeout(
            self.config
                .read_timeout(),
            read_request_line(
                &mut stream,
                self.config
                    .max_request_size(),
            ),
        )
        .await;

        let response = match line {
            Err(_) => {
                debug!("{} sent no request in time", peer);
                connection.transition(ConnectionState::Closed);
                return;
            }
            Ok(Err(e)) => {
                debug!("Cannot read request from {}: {}", peer, e);
                connection.transition(ConnectionState::Closed);
                return;
            }
            Ok(Ok(RequestLine::Eof)) => {
                connection.transition(ConnectionState::Closed);
                return;
            }
            Ok(Ok(RequestLine::TooLong)) => {
                info!("{}\t{}\t<request too long>", format_timestamp(SystemTime::now()), peer);
                Response::from(RequestError::TooLong)
            }
            Ok(Ok(RequestLine::Line(bytes))) => match String::from_utf8(bytes) {
                Ok(line) => {
                    info!("{}\t{}\t{}", format_timestamp(SystemTime::now()), peer, line);
                    connection.transition(ConnectionState::Resolving);
                    self.respond(&line, peer, local)
                        .await
                }
                Err(_) => {
                    info!("{}\t{}\t<invalid utf-8>", format_timestamp(SystemTime::now()), peer);
                    Response::from(RequestError::NotUtf8)
                }
            },
        };

        connection.transition(ConnectionState::Writing);
        match timeout(
            self.config
                .write_timeout(),
            write_response(&mut stream, &response),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Cannot write response to {}: {}", peer, e),
            Err(_) => warn!("Writing response to {} timed out", peer),
        }
        connection.transition(ConnectionState::Closed);
    }

    /// Builds the response for a request line.
    pub async fn respond(&self, line: &str, peer: SocketAddr, local: SocketAddr) -> Response {
        let request = match GeminiRequest::parse(line) {
            Ok(request) => request,
            Err(e) => {
                debug!("Refusing request from {}: {}", peer, e);
                return Response::from(e);
            }
        };

        let host = request
            .host()
            .unwrap_or(
                self.config
                    .security()
                    .hostname(),
            )
            .to_string();
        let context = RequestContext::new(&host, request.path(), peer, local)
            .with_port(request.port())
            .with_query(
                request
                    .query()
                    .map(str::to_string),
            )
            .with_media_prefix(
                self.resolver
                    .media_prefix(),
            );

        let store = self
            .store
            .clone();
        let resolver = self
            .resolver
            .clone();
        let path = request
            .path()
            .to_string();

        let resolved = tokio::task::spawn_blocking(move || {
            let resource = resolver.classify(&path, store.as_ref());
            resolve(store.as_ref(), resource.kind(), resource.id(), &context)
        })
        .await;

        match resolved {
            Ok(Ok(Resolved::Page(body))) => Response::success(&self.page_mime, body),
            Ok(Ok(Resolved::Media(path, media_type))) => match tokio::fs::read(&path).await {
                Ok(body) => Response::success(
                    media_type
                        .mime()
                        .as_ref(),
                    Bytes::from(body),
                ),
                Err(e) => {
                    error!("Cannot read media file {}: {}", path.display(), e);
                    Response::temporary_failure()
                }
            },
            Ok(Ok(Resolved::Missing)) | Ok(Err(StoreError::NotFound(_))) => Response::not_found(),
            Ok(Err(e)) => {
                error!("Cannot serve {} to {}: {}", request.path(), peer, e);
                Response::temporary_failure()
            }
            Err(e) => {
                error!("Rendering {} for {} panicked: {}", request.path(), peer, e);
                Response::temporary_failure()
            }
        }
    }
}

fn resolve(
    store: &dyn ContentStore,
    kind: ResourceKind,
    id: &str,
    context: &RequestContext,
) -> Result<Resolved, StoreError> {
    match kind {
        ResourceKind::Page => {
            if !store.page_exists(id) {
                return Ok(Resolved::Missing);
            }
            let body = store.render_page(id, context)?;
            Ok(Resolved::Page(body))
        }
        ResourceKind::Media => Ok(match store.resolve_media_path(id) {
            Some(path) => {
                let media_type = store.mime_type_for_file(&path);
                Resolved::Media(path, media_type)
            }
            None => Resolved::Missing,
        }),
    }
}

/// Reads up to the first LF. `max` bounds the line without its CRLF.
pub(crate) async fn read_request_line<S>(stream: &mut S, max: usize) -> io::Result<RequestLine>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let read = stream
            .read(&mut chunk)
            .await?;
        if read == 0 {
            return Ok(if line.is_empty() { RequestLine::Eof } else { RequestLine::Line(line) });
        }
        line.extend_from_slice(&chunk[..read]);

        if let Some(end) = line
            .iter()
            .position(|b| *b == b'\n')
        {
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.len() > max {
                return Ok(RequestLine::TooLong);
            }
            return Ok(RequestLine::Line(line));
        }

        // One extra byte may be the CR of a line of exactly `max` bytes.
        if line.len() > max + 1 {
            return Ok(RequestLine::TooLong);
        }
    }
}

async fn write_response<S>(stream: &mut S, response: &Response) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(
            response
                .header()
                .as_bytes(),
        )
        .await?;
    if let Some(body) = response.body() {
        stream
            .write_all(body)
            .await?;
    }
    stream
        .flush()
        .await?;
    stream
        .shutdown()
        .await
}
