//! Error handling types for gemwiki.
//!
//! Startup problems (configuration, binding, certificates, TLS) are fatal and
//! surface as [`GemwikiError`]. Problems with a single request never leave the
//! connection handler; they are turned into a Gemini status line instead.
//!
//! # Examples
//!
//! ```rust,ignore
//! use gemwiki::errors::{GemwikiError, CertificateError};
//!
//! match server.start().await {
//!     Ok(()) => {}
//!     Err(GemwikiError::Certificate(err)) => eprintln!("no usable certificate: {}", err),
//!     Err(other) => eprintln!("startup failed: {}", other),
//! }
//! ```

use thiserror::Error;

/// Main error type for gemwiki operations.
#[derive(Debug, Error, PartialEq)]
pub enum GemwikiError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to bind to a network address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// The listening socket stopped accepting connections
    #[error("Failed to accept connection: {0}")]
    Accept(String),

    /// Server startup errors
    #[error("Failed to start server: {0}")]
    Start(#[from] StartError),

    /// Server shutdown errors
    #[error("Failed to stop server: {0}")]
    Stop(String),

    /// Certificate could not be loaded or generated
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Content store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No server instances are running
    #[error("No instances")]
    NoInstances,
}

/// Configuration-related errors.
///
/// Raised by the `build()` methods of the configuration builders and while
/// loading a configuration file.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Invalid listener configuration
    #[error("Invalid listener config: {0}")]
    Listener(String),

    /// Invalid security configuration
    #[error("Invalid security config: {0}")]
    Security(String),

    /// Invalid server configuration
    #[error("Invalid server config: {0}")]
    Server(String),

    /// Invalid store configuration
    #[error("Invalid store config: {0}")]
    Store(String),

    /// Configuration file could not be read or parsed
    #[error("Invalid config file: {0}")]
    File(String),
}

/// Server startup errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StartError {
    /// TLS/SSL initialization errors
    #[error("Tls initialization: {0}")]
    Tls(String),

    /// The server was started without a content store
    #[error("No content store")]
    NoStore,
}

/// Certificate lifecycle errors.
///
/// Any of these prevents the server from listening: without a certificate
/// there is no TLS, and Gemini has no plaintext fallback.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CertificateError {
    /// Key pair generation failed
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Building or signing the certificate failed
    #[error("Certificate signing failed: {0}")]
    Signing(String),

    /// Reading or writing the certificate cache failed
    #[error("Certificate cache I/O failed: {0}")]
    Io(String),
}

/// Content store errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The requested identifier does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored document could not be decoded
    #[error("Invalid document {0}: {1}")]
    Document(String, String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<std::io::Error> for CertificateError {
    fn from(err: std::io::Error) -> Self {
        CertificateError::Io(err.to_string())
    }
}
