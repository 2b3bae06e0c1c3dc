//! # gemwiki
//!
//! **A Gemini server for wiki content**
//!
//! gemwiki serves the pages and media of a wiki over the Gemini protocol.
//! Pages arrive as a stream of structural events (headings, paragraphs,
//! links, lists, code blocks, ...) and are rendered to Gemtext on every
//! request; media files are served as they are.
//!
//! ## Features
//!
//! - **Self-signed TLS**: a long-lived certificate is generated per hostname
//!   and cached on disk, or an existing PEM file is used
//! - **Gemtext rendering**: inline links are numbered and listed at the end
//!   of each section, since Gemtext only knows links on their own lines
//! - **Safe request handling**: bounded request lines, traversal and foreign
//!   schemes refused with `59`, missing content answered with `51`
//! - **Pluggable content**: anything implementing [`store::ContentStore`]
//!   can be served; [`store::fs::FsStore`] reads a directory
//!
//! ## Basic Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use gemwiki::{
//!     config::{ListenerConfig, SecurityConfig, ServerConfig, StoreConfig},
//!     store::fs::FsStore,
//!     Gemwiki,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = ListenerConfig::builder()
//!         .port(1965)
//!         .interface("0.0.0.0")
//!         .build()?;
//!
//!     let security = SecurityConfig::builder()
//!         .hostname("example.org")
//!         .build()?;
//!
//!     let config = ServerConfig::builder()
//!         .add_listener(listener)
//!         .security(security)
//!         .build()?;
//!
//!     let store = FsStore::open(&StoreConfig::builder().root("/srv/wiki").build()?)?;
//!
//!     let mut server = Gemwiki::new(config, Arc::new(store));
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

use std::{net::SocketAddr, sync::Arc};

use log::{error, info};

use crate::{
    config::ServerConfig,
    errors::GemwikiError,
    server::{gemini::GeminiServer, Server},
    store::ContentStore,
};

pub mod config;
pub mod errors;
pub mod renderer;
pub mod server;
pub mod store;
pub mod utils;

mod tests;

/// Main server instance.
///
/// # Examples
///
/// ```rust,ignore
/// use gemwiki::{Gemwiki, config::ServerConfig};
///
/// let config = ServerConfig::builder()
///     .add_listener(listener)
///     .build()?;
///
/// let mut server = Gemwiki::new(config, store);
/// server.start().await?;
/// ```
pub struct Gemwiki {
    config: ServerConfig,
    store: Arc<dyn ContentStore>,
    instance: Option<GeminiServer>,
}

impl Gemwiki {
    /// Creates a new server serving `store` with the given configuration.
    pub fn new(config: ServerConfig, store: Arc<dyn ContentStore>) -> Gemwiki {
        Gemwiki { config, store, instance: None }
    }

    /// Returns a reference to the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the server and runs until interrupted.
    ///
    /// 1. Starts the server
    /// 2. Waits for Ctrl+C, or for a listener to fail accepting
    /// 3. Stops the server, letting in-flight requests finish
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start or to stop, or the
    /// accept error that ended it.
    pub async fn run(&mut self) -> Result<(), GemwikiError> {
        self.start()
            .await?;

        for addr in self.local_addrs() {
            info!("Server listening on {}", addr);
        }

        let failed = self
            .instance
            .as_ref()
            .map(GeminiServer::failure_signal)
            .ok_or(GemwikiError::NoInstances)?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("\nStopping server..."),
            _ = failed.cancelled() => error!("Stopping server, a listener can no longer accept"),
        }

        self.stop()
            .await?;

        Ok(())
    }

    /// Starts the server without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The certificate cannot be loaded or generated
    /// - TLS configuration fails
    /// - Server fails to bind to configured addresses
    pub async fn start(&mut self) -> Result<(), GemwikiError> {
        let mut server = GeminiServer::new(
            self.config
                .clone(),
        );

        server.set_store(
            self.store
                .clone(),
        );

        server
            .start()
            .await?;

        self.instance = Some(server);

        Ok(())
    }

    /// Stops the server gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not running or fails to stop.
    pub async fn stop(&mut self) -> Result<(), GemwikiError> {
        if let Some(mut instance) = self
            .instance
            .take()
        {
            instance
                .stop()
                .await?;
        } else {
            return Err(GemwikiError::NoInstances);
        }

        Ok(())
    }

    /// Addresses the running server is bound to.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.instance
            .as_ref()
            .map(GeminiServer::local_addrs)
            .unwrap_or_default()
    }
}
