//! Gemini server implementation.
//!
//! # Modules
//!
//! - [`certificate`]: Self-signed certificate generation and caching
//! - [`conn`]: Accept loop and per-connection handling
//! - [`context`]: Facts about the request being served
//! - [`path`]: Request path classification
//! - [`request`]: Request line parsing
//! - [`response`]: Status codes and response framing
//! - [`tls`]: TLS configuration

use std::{future::Future, sync::Arc};

use crate::{config::ServerConfig, errors::GemwikiError, store::ContentStore};

pub mod certificate;
pub mod conn;
pub mod context;
pub mod gemini;
pub mod path;
pub mod request;
pub mod response;
pub mod tls;

/// Trait for server implementations.
///
/// # Examples
///
/// ```rust,ignore
/// use gemwiki::{config::ServerConfig, server::{gemini::GeminiServer, Server}};
///
/// let mut server = GeminiServer::new(config);
/// server.set_store(store);
/// server.start().await?;
/// // Server is running...
/// server.stop().await?;
/// ```
pub trait Server {
    /// Creates a new server instance with the given configuration.
    fn new(config: ServerConfig) -> Self;

    /// Sets the content store pages and media are served from.
    ///
    /// This must be called before starting the server.
    fn set_store(&mut self, store: Arc<dyn ContentStore>);

    /// Obtains the certificate, binds every listener and begins accepting
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate cannot be obtained, TLS cannot
    /// be configured or a listener cannot bind.
    fn start(&mut self) -> impl Future<Output = Result<(), GemwikiError>>;

    /// Stops accepting and waits for in-flight connections, up to the
    /// configured grace period.
    fn stop(&mut self) -> impl Future<Output = Result<(), GemwikiError>>;
}
