use std::{
    error::Error,
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::CryptoProvider,
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, SignatureScheme,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::TlsConnector;

use crate::{
    config::{Concurrency, ListenerConfig, SecurityConfig, ServerConfig, ServerConfigBuilder},
    errors::{CertificateError, GemwikiError},
    server::{
        certificate::CertificateManager,
        conn::listener::tcp::is_transient_accept_error,
        tls::crypto_provider,
    },
    tests::support::wiki,
    Gemwiki,
};

/// Gemini trusts on first use; tests trust everything.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self
                .0
                .signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self
                .0
                .signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// One generated certificate shared by every test in this module.
fn certificate() -> PathBuf {
    static CERTIFICATE: OnceLock<PathBuf> = OnceLock::new();
    CERTIFICATE
        .get_or_init(|| {
            let dir = std::env::temp_dir().join(format!("gemwiki-tests-{}", std::process::id()));
            let config = SecurityConfig::builder()
                .hostname("localhost")
                .cache_dir(dir)
                .build()
                .unwrap();
            CertificateManager::new(config)
                .obtain()
                .unwrap()
        })
        .clone()
}

fn config(concurrency: Concurrency) -> ServerConfig {
    builder(concurrency)
        .build()
        .unwrap()
}

fn builder(concurrency: Concurrency) -> ServerConfigBuilder {
    ServerConfig::builder()
        .add_listener(
            ListenerConfig::builder()
                .interface("127.0.0.1")
                .port(0)
                .build()
                .unwrap(),
        )
        .security(
            SecurityConfig::builder()
                .hostname("localhost")
                .cert_file(certificate())
                .build()
                .unwrap(),
        )
        .concurrency(concurrency)
}

async fn request(addr: SocketAddr, line: &str) -> Result<String, Box<dyn Error>> {
    let provider = Arc::new(crypto_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let stream = TcpStream::connect(addr).await?;
    let mut tls = connector
        .connect(ServerName::try_from("localhost")?, stream)
        .await?;
    tls.write_all(line.as_bytes())
        .await?;

    let mut response = Vec::new();
    tls.read_to_end(&mut response)
        .await?;
    Ok(String::from_utf8(response)?)
}

#[tokio::test]
async fn test_gemini_over_tls() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let mut server = Gemwiki::new(config(Concurrency::PerConnection), Arc::new(store));
    server
        .start()
        .await?;
    let addr = server.local_addrs()[0];
    assert_ne!(addr.port(), 0);

    let response = request(addr, "gemini://localhost/\r\n").await?;
    assert!(response.starts_with("20 text/gemini; lang=en\r\n# Welcome\n"));

    let response = request(addr, "gemini://localhost/wiki/missing\r\n").await?;
    assert_eq!(response, "51 NOT FOUND\r\n");

    let response = request(addr, "gemini://localhost/../secret\r\n").await?;
    assert_eq!(response, "59 BAD URL\r\n");

    server
        .stop()
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_serial_mode() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let mut server = Gemwiki::new(config(Concurrency::Serial), Arc::new(store));
    server
        .start()
        .await?;
    let addr = server.local_addrs()[0];

    for _ in 0..3 {
        let response = request(addr, "gemini://localhost/_media/wiki/logo.png\r\n").await?;
        assert!(response.starts_with("20 image/png\r\n"));
    }

    server
        .stop()
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_handshake_keeps_serving() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let mut server = Gemwiki::new(config(Concurrency::PerConnection), Arc::new(store));
    server
        .start()
        .await?;
    let addr = server.local_addrs()[0];

    let mut plain = TcpStream::connect(addr).await?;
    plain
        .write_all(b"gemini://localhost/\r\n")
        .await?;
    let mut ignored = Vec::new();
    let _ = plain
        .read_to_end(&mut ignored)
        .await;
    assert!(!ignored.starts_with(b"20"));

    let response = request(addr, "gemini://localhost/\r\n").await?;
    assert!(response.starts_with("20 "));

    server
        .stop()
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_bind_conflict() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let store = Arc::new(store);
    let mut first = Gemwiki::new(config(Concurrency::PerConnection), store.clone());
    first
        .start()
        .await?;
    let addr = first.local_addrs()[0];

    let taken = ServerConfig::builder()
        .add_listener(
            ListenerConfig::builder()
                .interface("127.0.0.1")
                .port(addr.port())
                .build()?,
        )
        .security(
            SecurityConfig::builder()
                .cert_file(certificate())
                .build()?,
        )
        .build()?;
    let mut second = Gemwiki::new(taken, store);
    let result = second
        .start()
        .await;
    assert!(matches!(result, Err(GemwikiError::Bind(_))));

    first
        .stop()
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_certificate_aborts_start() -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let config = ServerConfig::builder()
        .add_listener(
            ListenerConfig::builder()
                .interface("127.0.0.1")
                .port(0)
                .build()?,
        )
        .security(
            SecurityConfig::builder()
                .cert_file("/nonexistent/gemwiki.pem")
                .build()?,
        )
        .build()?;

    let mut server = Gemwiki::new(config, Arc::new(store));
    let result = server
        .start()
        .await;
    assert!(matches!(result, Err(GemwikiError::Certificate(CertificateError::Io(_)))));
    assert!(server
        .local_addrs()
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_stop_without_start() {
    let (_dir, store) = wiki();
    let mut server = Gemwiki::new(config(Concurrency::PerConnection), Arc::new(store));
    let result = server
        .stop()
        .await;
    assert_eq!(result, Err(GemwikiError::NoInstances));
}

/// Idle clients that never start a handshake must not hold up `stop`
/// beyond the grace period, whether served inline or in their own task.
async fn assert_stop_within_grace(config: ServerConfig, idle_clients: usize) -> Result<(), Box<dyn Error>> {
    let (_dir, store) = wiki();
    let mut server = Gemwiki::new(config, Arc::new(store));
    server
        .start()
        .await?;
    let addr = server.local_addrs()[0];

    let mut idle = Vec::new();
    for _ in 0..idle_clients {
        idle.push(TcpStream::connect(addr).await?);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    server
        .stop()
        .await?;
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_secs(3), "stop took {:?}", elapsed);
    drop(idle);
    Ok(())
}

#[tokio::test]
async fn test_stop_bounds_serial_connection() -> Result<(), Box<dyn Error>> {
    let config = builder(Concurrency::Serial)
        .handshake_timeout(Duration::from_secs(8))
        .shutdown_grace(Duration::from_secs(1))
        .build()?;
    assert_stop_within_grace(config, 1).await
}

#[tokio::test]
async fn test_stop_bounds_overflow_connection() -> Result<(), Box<dyn Error>> {
    let config = builder(Concurrency::PerConnection)
        .max_connections(1)
        .handshake_timeout(Duration::from_secs(8))
        .shutdown_grace(Duration::from_secs(1))
        .build()?;
    assert_stop_within_grace(config, 2).await
}

#[test]
fn test_accept_error_classification() {
    for kind in [io::ErrorKind::ConnectionAborted, io::ErrorKind::ConnectionReset, io::ErrorKind::Interrupted] {
        assert!(is_transient_accept_error(&io::Error::from(kind)));
    }
    // Exhausted descriptors (EMFILE) and other socket failures end the loop.
    assert!(!is_transient_accept_error(&io::Error::from_raw_os_error(24)));
    assert!(!is_transient_accept_error(&io::Error::from(io::ErrorKind::InvalidInput)));
}
