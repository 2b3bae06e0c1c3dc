use std::{fs, path::Path, sync::Arc};

use rustls::{
    crypto::CryptoProvider,
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer},
    ServerConfig,
};

use crate::errors::{GemwikiError, StartError::Tls};

/// Crypto backend selected at build time.
pub(crate) fn crypto_provider() -> CryptoProvider {
    cfg_if::cfg_if! {
        if #[cfg(feature = "__rustls_ring")] {
            rustls::crypto::ring::default_provider()
        } else {
            rustls::crypto::aws_lc_rs::default_provider()
        }
    }
}

pub struct TlsFactory {}

impl TlsFactory {
    /// Builds the TLS server configuration from a PEM file holding the
    /// certificate chain and the private key.
    ///
    /// TLS 1.2 and 1.3 are offered; client certificates are not requested.
    pub fn create_tls_config(pem_path: &Path) -> Result<ServerConfig, GemwikiError> {
        let provider = crypto_provider();

        let pem = fs::read(pem_path).map_err(|e| {
            GemwikiError::Start(Tls(format!("Failed to read {}: {}", pem_path.display(), e)))
        })?;

        let chain = CertificateDer::pem_slice_iter(&pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Tls("Failed to parse certificate".to_string()))?;
        if chain.is_empty() {
            return Err(GemwikiError::Start(Tls(format!(
                "No certificate in {}",
                pem_path.display()
            ))));
        }

        let key = PrivateKeyDer::from_pem_slice(&pem)
            .map_err(|_| Tls("Failed to parse private key".to_string()))?;

        let builder = rustls::ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| GemwikiError::Start(Tls(e.to_string())))?;

        let tls_config = builder
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|e| GemwikiError::Start(Tls(e.to_string())))?;

        Ok(tls_config)
    }
}
