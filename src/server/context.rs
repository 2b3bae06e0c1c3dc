use std::net::SocketAddr;

/// Per-request facts handed to the content store and the renderer.
///
/// Each connection builds its own value, so concurrent requests never see
/// each other's host or peer.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext {
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    peer: SocketAddr,
    local: SocketAddr,
    media_prefix: String,
}

impl RequestContext {
    pub fn new(host: &str, path: &str, peer: SocketAddr, local: SocketAddr) -> Self {
        RequestContext {
            host: host.to_string(),
            port: None,
            path: path.to_string(),
            query: None,
            peer,
            local,
            media_prefix: crate::config::DEFAULT_MEDIA_PREFIX.to_string(),
        }
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_media_prefix(mut self, prefix: &str) -> Self {
        self.media_prefix = prefix.to_string();
        self
    }

    /// Host named in the request URL, or the configured hostname.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Decoded request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query
            .as_deref()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn media_prefix(&self) -> &str {
        &self.media_prefix
    }

    /// Authority used in same-origin links, `host` or `host:port`.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self
                .host
                .clone(),
        }
    }

    /// Scheme-relative URL of a page.
    pub fn page_url(&self, id: &str) -> String {
        format!("//{}/{}", self.authority(), id)
    }

    /// Scheme-relative URL of a media item.
    pub fn media_url(&self, id: &str) -> String {
        format!("//{}{}{}", self.authority(), self.media_prefix, id)
    }
}
