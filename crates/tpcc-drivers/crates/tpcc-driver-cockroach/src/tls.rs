//! CockroachDB TLS Support
//!
//! Builds the TLS connector for tokio-postgres from the settings extracted
//! out of the connection string.

use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use std::path::Path;
use tokio_postgres::config::SslMode;
use tpcc_core::TpccError;
use tpcc_core::security::{TlsConfig, TlsMode};
use tracing::debug;

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    #[error("Failed to load client certificate from {path}: {source}")]
    ClientCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to load client key from {path}: {source}")]
    ClientKeyLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    #[error("TLS mode {mode:?} is not supported for this operation")]
    UnsupportedMode { mode: TlsMode },
}

impl From<TlsError> for TpccError {
    fn from(err: TlsError) -> Self {
        TpccError::Configuration(err.to_string())
    }
}

type TlsResult<T> = std::result::Result<T, TlsError>;

/// Builds TLS connectors for tokio-postgres
#[derive(Debug, Clone)]
pub struct CockroachTlsConnector;

impl CockroachTlsConnector {
    /// Build a TLS connector from configuration.
    ///
    /// Fails for [`TlsMode::Disable`]; use `NoTls` instead.
    pub fn build(config: &TlsConfig) -> TlsResult<MakeTlsConnector> {
        config
            .validate()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        if config.mode == TlsMode::Disable {
            return Err(TlsError::UnsupportedMode { mode: config.mode });
        }

        debug!(mode = ?config.mode, "building TLS connector");

        let mut builder = NativeTlsConnector::builder();

        configure_verification(&mut builder, config)?;

        if let Some(ca_cert_path) = &config.ca_cert {
            apply_ca_cert(&mut builder, ca_cert_path)?;
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.client_key) {
            apply_client_cert(&mut builder, cert_path, key_path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        Ok(MakeTlsConnector::new(connector))
    }

    pub fn is_disabled(config: &TlsConfig) -> bool {
        config.mode == TlsMode::Disable
    }
}

/// Configure certificate verification based on TLS mode.
///
/// `allow`, `prefer` and `require` encrypt without verifying, except that
/// `require` with a root certificate verifies the chain like `verify-ca`.
fn configure_verification(builder: &mut TlsConnectorBuilder, config: &TlsConfig) -> TlsResult<()> {
    match config.mode {
        TlsMode::Disable => {
            return Err(TlsError::UnsupportedMode { mode: config.mode });
        }
        TlsMode::Require if config.ca_cert.is_some() => {
            debug!("require with root certificate, verifying CA only");
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::Allow | TlsMode::Prefer | TlsMode::Require => {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {}
    }

    Ok(())
}

/// Load and apply a PEM-encoded CA certificate
fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> TlsResult<()> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;

    builder.add_root_certificate(cert);
    Ok(())
}

/// Load and apply a PEM client certificate and PKCS#8 key for mutual TLS
fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> TlsResult<()> {
    debug!(
        cert_path = %cert_path.display(),
        key_path = %key_path.display(),
        "loading client certificate and key"
    );

    let cert_pem = fs::read(cert_path).map_err(|e| TlsError::ClientCertLoadFailed {
        path: cert_path.display().to_string(),
        source: e,
    })?;

    let key_pem = fs::read(key_path).map_err(|e| TlsError::ClientKeyLoadFailed {
        path: key_path.display().to_string(),
        source: e,
    })?;

    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;

    builder.identity(identity);
    Ok(())
}

/// The tokio-postgres negotiation mode for a libpq `sslmode`.
///
/// tokio-postgres only distinguishes disable/prefer/require; certificate
/// checks for the verifying modes are done by the connector.
pub fn negotiation_mode(mode: TlsMode) -> SslMode {
    match mode {
        TlsMode::Disable => SslMode::Disable,
        TlsMode::Allow | TlsMode::Prefer => SslMode::Prefer,
        TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
    }
}

#[cfg(test)]
mod tests;
