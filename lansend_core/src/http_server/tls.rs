//! TLS material for the receiver endpoint.

use crate::config::{AppConfig, DEFAULT_CERT_FILE, DEFAULT_KEY_FILE};
use anyhow::{Context, Result, bail};
use axum_server::tls_rustls::RustlsConfig;
use rcgen::generate_simple_self_signed;
use std::path::{Path, PathBuf};

/// Where the certificate comes from
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Generate an in-memory self-signed certificate when the files are missing
    pub allow_self_signed: bool,
}

impl TlsSettings {
    /// Self-signed fallback is only allowed while both paths are the defaults
    pub fn from_config(config: &AppConfig) -> Self {
        let allow_self_signed = config.cert_path == Path::new(DEFAULT_CERT_FILE)
            && config.key_path == Path::new(DEFAULT_KEY_FILE);
        Self {
            cert_path: config.cert_path.clone(),
            key_path: config.key_path.clone(),
            allow_self_signed,
        }
    }
}

/// Install the ring provider as the process default. Safe to call twice.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Load the PEM pair, or fall back to a generated certificate if allowed
pub async fn load_tls_config(settings: &TlsSettings, hostnames: &[String]) -> Result<RustlsConfig> {
    let cert_exists = tokio::fs::try_exists(&settings.cert_path)
        .await
        .unwrap_or(false);
    let key_exists = tokio::fs::try_exists(&settings.key_path)
        .await
        .unwrap_or(false);

    if cert_exists && key_exists {
        tracing::info!(
            "Loading TLS certificate from {:?} and key from {:?}",
            settings.cert_path,
            settings.key_path
        );
        return RustlsConfig::from_pem_file(&settings.cert_path, &settings.key_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to load SSL certificate or key ({:?}, {:?})",
                    settings.cert_path, settings.key_path
                )
            });
    }

    if !settings.allow_self_signed {
        bail!(
            "SSL certificate ({:?}) or key ({:?}) not found",
            settings.cert_path,
            settings.key_path
        );
    }

    tracing::warn!(
        "No certificate at {:?}; using a generated self-signed certificate",
        settings.cert_path
    );
    generate_self_signed(hostnames).await
}

/// Build an in-memory self-signed TLS config
pub async fn generate_self_signed(hostnames: &[String]) -> Result<RustlsConfig> {
    let mut subject_alt_names = vec!["localhost".to_string()];
    // SANs must be IA5 strings
    subject_alt_names.extend(
        hostnames
            .iter()
            .filter(|h| !h.is_empty() && h.is_ascii() && !h.contains(' '))
            .cloned(),
    );

    let certified_key = generate_simple_self_signed(subject_alt_names)
        .context("Failed to generate self-signed certificate")?;
    let cert_der = certified_key.cert.der().to_vec();
    let key_der = certified_key.signing_key.serialize_der();

    RustlsConfig::from_der(vec![cert_der], key_der)
        .await
        .context("Failed to create TLS configuration")
}
