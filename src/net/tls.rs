//! TLS configuration and certificate loading for the listener.

use axum_server::tls_rustls::RustlsConfig;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Failure to load the listener's certificate material. Fatal at startup.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid PEM in {path}: {source}")]
    Pem {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("failed to build TLS config: {0}")]
    Config(#[source] io::Error),
}

/// Load TLS configuration from certificate and key files (PEM).
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let cert_name = cert_path.display().to_string();
    let key_name = key_path.display().to_string();

    let cert_pem = tokio::fs::read(cert_path).await.map_err(|source| TlsError::Read {
        path: cert_name.clone(),
        source,
    })?;
    let key_pem = tokio::fs::read(key_path).await.map_err(|source| TlsError::Read {
        path: key_name.clone(),
        source,
    })?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: cert_name.clone(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_name));
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|source| TlsError::Pem {
            path: key_name.clone(),
            source,
        })?
        .ok_or(TlsError::NoPrivateKey(key_name))?;

    tracing::info!(certificate = %cert_name, chain_len = certs.len(), "Loaded listener certificate");

    RustlsConfig::from_der(
        certs.into_iter().map(|cert| cert.to_vec()).collect(),
        key.secret_der().to_vec(),
    )
    .await
    .map_err(TlsError::Config)
}
