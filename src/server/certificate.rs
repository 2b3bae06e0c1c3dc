//! Self-signed certificate provisioning.
//!
//! Gemini clients pin certificates on first use instead of validating a
//! chain, so a long-lived self-signed certificate per hostname is enough.
//! The certificate and its private key are stored together in one PEM file
//! under the cache directory and replaced wholesale once they get too old.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use log::{debug, info};
use rand::Rng;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, Ia5String, KeyPair, RsaKeySize, SerialNumber,
    PKCS_RSA_SHA256,
};
use time::OffsetDateTime;

use crate::{
    config::SecurityConfig,
    errors::{CertificateError, GemwikiError},
};

/// PKCS#9 emailAddress attribute.
const EMAIL_ADDRESS_OID: [u64; 7] = [1, 2, 840, 113549, 1, 9, 1];

/// Supplies the PEM file the TLS layer loads.
#[derive(Clone, Debug)]
pub struct CertificateManager {
    config: SecurityConfig,
}

impl CertificateManager {
    pub fn new(config: SecurityConfig) -> Self {
        CertificateManager { config }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Cached certificate location for the configured hostname.
    pub fn cache_path(&self) -> PathBuf {
        let name: String = self
            .config
            .hostname()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
            .collect();

        self.config
            .cache_dir()
            .join(format!("{}.pem", name))
    }

    /// Returns the path of a usable certificate file.
    ///
    /// A configured certificate file is used as is. Otherwise the cached
    /// certificate is reused while younger than the validity window minus
    /// the renewal margin, and regenerated when missing or older.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured file is missing, or generation or
    /// writing the cache fails.
    pub fn obtain(&self) -> Result<PathBuf, GemwikiError> {
        if let Some(cert_file) = self
            .config
            .cert_file()
        {
            if !cert_file.is_file() {
                return Err(CertificateError::Io(format!(
                    "certificate file {} not found",
                    cert_file.display()
                ))
                .into());
            }
            info!("Using certificate {}", cert_file.display());
            return Ok(cert_file.to_path_buf());
        }

        let path = self.cache_path();
        if self.is_fresh(&path) {
            info!("Using cached certificate {}", path.display());
            return Ok(path);
        }

        info!(
            "Generating self-signed certificate for {} in {}",
            self.config.hostname(),
            path.display()
        );
        let pem = self.generate()?;
        write_atomic(&path, &pem)?;
        Ok(path)
    }

    /// Generates a certificate and returns it followed by its private key,
    /// both PEM encoded.
    pub fn generate(&self) -> Result<String, CertificateError> {
        let hostname = self
            .config
            .hostname()
            .to_string();

        let key = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_4096)
            .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;

        let mut params = CertificateParams::new(vec![hostname.clone()])
            .map_err(|e| CertificateError::Signing(e.to_string()))?;

        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, hostname);
        name.push(DnType::OrganizationName, self.config.organization());
        let email = Ia5String::try_from(
            self.config
                .email()
                .to_string(),
        )
        .map_err(|e| CertificateError::Signing(e.to_string()))?;
        name.push(DnType::CustomDnType(EMAIL_ADDRESS_OID.to_vec()), DnValue::Ia5String(email));
        params.distinguished_name = name;

        // Positive and non-zero once DER encoded.
        let serial = rand::rng().random::<u64>() >> 1 | 1;
        params.serial_number = Some(SerialNumber::from(serial));

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(i64::from(self.config.validity_days()));

        let cert = params
            .self_signed(&key)
            .map_err(|e| CertificateError::Signing(e.to_string()))?;

        Ok(format!("{}{}", cert.pem(), key.serialize_pem()))
    }

    fn is_fresh(&self, path: &Path) -> bool {
        let age = fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| {
                SystemTime::now()
                    .duration_since(modified)
                    .ok()
            });

        match age {
            Some(age) if age < self.config.max_age() => true,
            Some(age) => {
                debug!("Cached certificate {} is {}s old", path.display(), age.as_secs());
                false
            }
            None => false,
        }
    }
}

/// Replaces `path` by writing a sibling file and renaming it over.
fn write_atomic(path: &Path, contents: &str) -> Result<(), CertificateError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let suffix: u32 = rand::rng().random();
    let tmp = path.with_extension(format!("pem.{:08x}.tmp", suffix));
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
