//! Configuration builders and types for gemwiki.
//!
//! This module provides a fluent builder API for configuring:
//! - Listeners (interfaces and ports)
//! - Security (hostname, certificate file or self-signed certificate cache)
//! - Server behaviour (timeouts, request size bound, concurrency policy)
//! - The filesystem content store
//!
//! Every type also implements `Deserialize`, so the same settings can be
//! loaded from a YAML file with [`FileConfig::from_file`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use gemwiki::config::{ListenerConfig, SecurityConfig, ServerConfig};
//!
//! let listener = ListenerConfig::builder()
//!     .port(1965)
//!     .interface("0.0.0.0")
//!     .build()?;
//!
//! let security = SecurityConfig::builder()
//!     .hostname("example.org")
//!     .build()?;
//!
//! let config = ServerConfig::builder()
//!     .add_listener(listener)
//!     .security(security)
//!     .build()?;
//! ```

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::errors::{ConfigError, GemwikiError};

/// Well-known Gemini port.
pub const DEFAULT_PORT: u16 = 1965;

/// Default request line bound, excluding the line terminator.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024;

/// Default prefix of paths served as raw media.
pub const DEFAULT_MEDIA_PREFIX: &str = "/_media/";

fn default_cache_dir() -> PathBuf {
    match env::var_os("XDG_CACHE_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("gemwiki"),
        _ => PathBuf::from(".gemwiki-cache"),
    }
}

/// How accepted connections are scheduled.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// One task per connection, bounded by `max_connections`.
    /// Connections that find no free slot are served inline.
    #[default]
    PerConnection,
    /// Every connection is served inline in the accept loop.
    Serial,
}

/// Builder for creating `ListenerConfig` instances.
///
/// # Examples
///
/// ```rust,ignore
/// use gemwiki::config::ListenerConfig;
///
/// let config = ListenerConfig::builder()
///     .port(1965)
///     .interface("::")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct ListenerConfigBuilder {
    port: u16,
    interface: String,
}

impl ListenerConfigBuilder {
    /// Sets the port number for the listener.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the network interface to bind to.
    ///
    /// Common values:
    /// - "0.0.0.0" - All IPv4 interfaces
    /// - "::" - All IPv6 interfaces
    /// - "127.0.0.1" - Localhost only
    pub fn interface(mut self, interface: &str) -> Self {
        self.interface = interface.to_string();
        self
    }

    /// Creates the `ListenerConfig` with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is not an IP address.
    pub fn build(self) -> Result<ListenerConfig, GemwikiError> {
        let config = ListenerConfig { port: self.port, interface: self.interface };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for a listening socket.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    port: u16,
    interface: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig { port: DEFAULT_PORT, interface: "0.0.0.0".to_string() }
    }
}

impl ListenerConfig {
    /// Creates a new `ListenerConfigBuilder` with default settings.
    ///
    /// Default values:
    /// - port: 1965
    /// - interface: "0.0.0.0"
    pub fn builder() -> ListenerConfigBuilder {
        let defaults = ListenerConfig::default();
        ListenerConfigBuilder { port: defaults.port, interface: defaults.interface }
    }

    /// Returns the port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the network interface.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub(crate) fn validate(&self) -> Result<(), GemwikiError> {
        if self
            .interface
            .parse::<std::net::IpAddr>()
            .is_err()
        {
            return Err(GemwikiError::Config(ConfigError::Listener(format!(
                "interface {} is not an IP address",
                self.interface
            ))));
        }
        Ok(())
    }
}

/// Builder for creating `SecurityConfig` instances.
///
/// # Examples
///
/// ```rust,ignore
/// use gemwiki::config::SecurityConfig;
///
/// // Self-signed certificate, cached for ten years
/// let generated = SecurityConfig::builder()
///     .hostname("example.org")
///     .cache_dir("/var/cache/gemwiki")
///     .build()?;
///
/// // Existing certificate, generation bypassed
/// let provided = SecurityConfig::builder()
///     .hostname("example.org")
///     .cert_file("/etc/gemwiki/example.org.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct SecurityConfigBuilder {
    inner: SecurityConfig,
}

impl SecurityConfigBuilder {
    /// Sets the hostname used as certificate common name.
    pub fn hostname(mut self, hostname: &str) -> Self {
        self.inner.hostname = hostname.to_string();
        self
    }

    /// Uses an existing PEM file (certificate followed by private key).
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.inner.cert_file = Some(
            path.as_ref()
                .to_path_buf(),
        );
        self
    }

    /// Sets the directory holding generated certificates.
    pub fn cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.inner.cache_dir = path
            .as_ref()
            .to_path_buf();
        self
    }

    /// Sets the validity of generated certificates, in days.
    pub fn validity_days(mut self, days: u32) -> Self {
        self.inner.validity_days = days;
        self
    }

    /// Sets how many days before expiry a cached certificate is replaced.
    pub fn renewal_margin_days(mut self, days: u32) -> Self {
        self.inner.renewal_margin_days = days;
        self
    }

    /// Sets the organization name written into generated certificates.
    pub fn organization(mut self, organization: &str) -> Self {
        self.inner.organization = organization.to_string();
        self
    }

    /// Sets the contact address written into generated certificates.
    pub fn email(mut self, email: &str) -> Self {
        self.inner.email = email.to_string();
        self
    }

    /// Creates the `SecurityConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is empty or the validity window
    /// leaves no room for the renewal margin.
    pub fn build(self) -> Result<SecurityConfig, GemwikiError> {
        self.inner
            .validate()?;
        Ok(self.inner)
    }
}

/// Certificate settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    hostname: String,
    cert_file: Option<PathBuf>,
    cache_dir: PathBuf,
    validity_days: u32,
    renewal_margin_days: u32,
    organization: String,
    email: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            hostname: "localhost".to_string(),
            cert_file: None,
            cache_dir: default_cache_dir(),
            validity_days: 3650,
            renewal_margin_days: 30,
            organization: "gemwiki".to_string(),
            email: "admin@example.com".to_string(),
        }
    }
}

impl SecurityConfig {
    /// Creates a new `SecurityConfigBuilder` with default settings.
    ///
    /// Default values:
    /// - hostname: "localhost"
    /// - cert_file: None (generate a self-signed certificate)
    /// - cache_dir: `$XDG_CACHE_HOME/gemwiki` or `.gemwiki-cache`
    /// - validity_days: 3650
    /// - renewal_margin_days: 30
    pub fn builder() -> SecurityConfigBuilder {
        SecurityConfigBuilder { inner: SecurityConfig::default() }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file
            .as_deref()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn validity_days(&self) -> u32 {
        self.validity_days
    }

    pub fn renewal_margin_days(&self) -> u32 {
        self.renewal_margin_days
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Age after which a cached certificate is regenerated.
    pub fn max_age(&self) -> Duration {
        let days = self
            .validity_days
            .saturating_sub(self.renewal_margin_days);
        Duration::from_secs(u64::from(days) * 24 * 60 * 60)
    }

    pub(crate) fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    pub(crate) fn set_cert_file(&mut self, path: PathBuf) {
        self.cert_file = Some(path);
    }

    pub(crate) fn validate(&self) -> Result<(), GemwikiError> {
        if self
            .hostname
            .trim()
            .is_empty()
        {
            return Err(GemwikiError::Config(ConfigError::Security(
                "hostname is empty".to_string(),
            )));
        }
        if self.validity_days == 0 || self.renewal_margin_days >= self.validity_days {
            return Err(GemwikiError::Config(ConfigError::Security(
                "validity window must be longer than the renewal margin".to_string(),
            )));
        }
        Ok(())
    }
}

/// Builder for creating `ServerConfig` instances.
///
/// # Examples
///
/// ```rust,ignore
/// use gemwiki::config::{Concurrency, ListenerConfig, ServerConfig};
///
/// let config = ServerConfig::builder()
///     .add_listener(ListenerConfig::builder().interface("0.0.0.0").build()?)
///     .add_listener(ListenerConfig::builder().interface("::").build()?)
///     .concurrency(Concurrency::PerConnection)
///     .max_connections(64)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct ServerConfigBuilder {
    inner: ServerConfig,
}

impl ServerConfigBuilder {
    /// Adds a listener configuration to the server.
    pub fn add_listener(mut self, listener: ListenerConfig) -> Self {
        self.inner
            .listeners
            .push(listener);
        self
    }

    /// Sets the certificate settings.
    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.inner.security = security;
        self
    }

    /// Sets the language advertised with rendered pages.
    pub fn lang(mut self, lang: &str) -> Self {
        self.inner.lang = lang.to_string();
        self
    }

    /// Sets the path prefix served as raw media.
    pub fn media_prefix(mut self, prefix: &str) -> Self {
        self.inner.media_prefix = prefix.to_string();
        self
    }

    /// Sets the request line bound in bytes, excluding the terminator.
    pub fn max_request_size(mut self, size: usize) -> Self {
        self.inner.max_request_size = size;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.inner.handshake_timeout_secs = timeout.as_secs();
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.inner.read_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets how long writing a response may take before the client is
    /// dropped.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.inner.write_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets how long in-flight connections may run after a stop request.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.inner.shutdown_grace_secs = grace.as_secs();
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.inner.concurrency = concurrency;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.inner.max_connections = max;
        self
    }

    /// Creates the `ServerConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if no listener was added or a bound is zero.
    pub fn build(self) -> Result<ServerConfig, GemwikiError> {
        self.inner
            .validate()?;
        Ok(self.inner)
    }
}

/// Global server configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    listeners: Vec<ListenerConfig>,
    security: SecurityConfig,
    lang: String,
    media_prefix: String,
    max_request_size: usize,
    handshake_timeout_secs: u64,
    read_timeout_secs: u64,
    write_timeout_secs: u64,
    shutdown_grace_secs: u64,
    concurrency: Concurrency,
    max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listeners: vec![ListenerConfig::default()],
            security: SecurityConfig::default(),
            lang: "en".to_string(),
            media_prefix: DEFAULT_MEDIA_PREFIX.to_string(),
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            handshake_timeout_secs: 10,
            read_timeout_secs: 10,
            write_timeout_secs: 30,
            shutdown_grace_secs: 5,
            concurrency: Concurrency::PerConnection,
            max_connections: 256,
        }
    }
}

impl ServerConfig {
    /// Creates a new `ServerConfigBuilder` with no listeners and default
    /// settings otherwise.
    pub fn builder() -> ServerConfigBuilder {
        let mut inner = ServerConfig::default();
        inner
            .listeners
            .clear();
        ServerConfigBuilder { inner }
    }

    /// Returns a reference to all configured listeners.
    pub fn listeners(&self) -> &Vec<ListenerConfig> {
        &self.listeners
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn media_prefix(&self) -> &str {
        &self.media_prefix
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// MIME type announced for rendered pages.
    pub fn page_mime(&self) -> String {
        if self
            .lang
            .is_empty()
        {
            "text/gemini".to_string()
        } else {
            format!("text/gemini; lang={}", self.lang)
        }
    }

    pub(crate) fn listeners_mut(&mut self) -> &mut Vec<ListenerConfig> {
        &mut self.listeners
    }

    pub(crate) fn security_mut(&mut self) -> &mut SecurityConfig {
        &mut self.security
    }

    pub(crate) fn validate(&self) -> Result<(), GemwikiError> {
        if self
            .listeners
            .is_empty()
        {
            return Err(GemwikiError::Config(ConfigError::Server(
                "at least one listener is required".to_string(),
            )));
        }
        for listener in &self.listeners {
            listener.validate()?;
        }
        self.security
            .validate()?;
        if !self
            .media_prefix
            .starts_with('/')
            || !self
                .media_prefix
                .ends_with('/')
            || self.media_prefix.len() < 3
        {
            return Err(GemwikiError::Config(ConfigError::Server(format!(
                "media prefix {} must look like /name/",
                self.media_prefix
            ))));
        }
        if self.max_request_size == 0 {
            return Err(GemwikiError::Config(ConfigError::Server(
                "max request size must be positive".to_string(),
            )));
        }
        if self.max_connections == 0 {
            return Err(GemwikiError::Config(ConfigError::Server(
                "max connections must be positive".to_string(),
            )));
        }
        Ok(())
    }
}

/// Builder for creating `StoreConfig` instances.
#[derive(Clone)]
pub struct StoreConfigBuilder {
    inner: StoreConfig,
}

impl StoreConfigBuilder {
    /// Sets the content directory holding `pages/` and `media/`.
    pub fn root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.inner.root = root
            .as_ref()
            .to_path_buf();
        self
    }

    /// Sets the page served for the root path and for namespace paths.
    pub fn start_page(mut self, start_page: &str) -> Self {
        self.inner.start_page = start_page.to_string();
        self
    }

    /// Adds an interwiki shortcut.
    ///
    /// `{NAME}` in the template is replaced by the encoded reference;
    /// without it the reference is appended. A template starting with `:`
    /// points at a page of this wiki.
    pub fn interwiki(mut self, name: &str, template: &str) -> Self {
        self.inner
            .interwiki
            .insert(name.to_lowercase(), template.to_string());
        self
    }

    pub fn build(self) -> Result<StoreConfig, GemwikiError> {
        self.inner
            .validate()?;
        Ok(self.inner)
    }
}

/// Filesystem content store settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    root: PathBuf,
    start_page: String,
    interwiki: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            root: PathBuf::from("."),
            start_page: "start".to_string(),
            interwiki: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder { inner: StoreConfig::default() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn start_page(&self) -> &str {
        &self.start_page
    }

    pub fn interwiki(&self) -> &BTreeMap<String, String> {
        &self.interwiki
    }

    pub(crate) fn set_root(&mut self, root: PathBuf) {
        self.root = root;
    }

    pub(crate) fn validate(&self) -> Result<(), GemwikiError> {
        if self
            .start_page
            .is_empty()
            || self
                .start_page
                .contains(':')
        {
            return Err(GemwikiError::Config(ConfigError::Store(
                "start page must be a plain page name".to_string(),
            )));
        }
        Ok(())
    }
}

/// Layout of the YAML configuration file.
///
/// ```yaml
/// server:
///   listeners:
///     - interface: "0.0.0.0"
///       port: 1965
///   security:
///     hostname: example.org
///   lang: en
/// store:
///   root: /srv/wiki
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
}

impl FileConfig {
    /// Parses a configuration document.
    pub fn from_yaml(source: &str) -> Result<FileConfig, GemwikiError> {
        let config = serde_yaml_ng::from_str::<FileConfig>(source)
            .map_err(|e| GemwikiError::Config(ConfigError::File(e.to_string())))?;
        config
            .server
            .validate()?;
        config
            .store
            .validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<FileConfig, GemwikiError> {
        let source = fs::read_to_string(path.as_ref()).map_err(|e| {
            GemwikiError::Config(ConfigError::File(format!(
                "{}: {}",
                path.as_ref()
                    .display(),
                e
            )))
        })?;
        FileConfig::from_yaml(&source)
    }

    /// Applies command line overrides.
    ///
    /// A listener override replaces every configured listener.
    pub fn apply_overrides(
        &mut self,
        interface: Option<&str>,
        port: Option<u16>,
        hostname: Option<&str>,
        cert_file: Option<PathBuf>,
        root: Option<PathBuf>,
    ) -> Result<(), GemwikiError> {
        if interface.is_some() || port.is_some() {
            let current = self
                .server
                .listeners()
                .first()
                .cloned()
                .unwrap_or_default();
            let listener = ListenerConfig::builder()
                .interface(interface.unwrap_or(current.interface()))
                .port(port.unwrap_or(current.port()))
                .build()?;
            let listeners = self
                .server
                .listeners_mut();
            listeners.clear();
            listeners.push(listener);
        }
        if let Some(hostname) = hostname {
            self.server
                .security_mut()
                .set_hostname(hostname);
        }
        if let Some(cert_file) = cert_file {
            self.server
                .security_mut()
                .set_cert_file(cert_file);
        }
        if let Some(root) = root {
            self.store
                .set_root(root);
        }
        self.server
            .validate()?;
        self.store
            .validate()
    }
}
