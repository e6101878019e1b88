//! TLS/SSL Configuration Types
//!
//! TLS settings are carried inside the connection string using the libpq
//! parameters `sslmode`, `sslrootcert`, `sslcert` and `sslkey`. They are
//! extracted here so the driver can build its own TLS connector and hand the
//! remaining string to the wire driver.

use crate::{Result, TpccError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use url::form_urlencoded;

/// Connection-string parameters consumed by the TLS layer
const TLS_PARAMS: &[&str] = &["sslmode", "sslrootcert", "sslcert", "sslkey"];

/// TLS/SSL mode for database connections, following libpq `sslmode`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Plain TCP
    Disable,
    /// Try TLS, fall back to unencrypted if unavailable
    Allow,
    #[default]
    Prefer,
    /// Require TLS, but don't verify the server certificate
    Require,
    /// Require TLS and verify the server certificate against the CA
    VerifyCa,
    /// Require TLS, verify CA, and verify the server hostname matches
    VerifyFull,
}

impl TlsMode {
    /// Returns true if this mode requires encryption
    pub fn requires_encryption(&self) -> bool {
        matches!(
            self,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull
        )
    }

    /// Returns true if this mode requires certificate verification
    pub fn requires_ca_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }

    /// Returns true if this mode requires hostname verification
    pub fn requires_hostname_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyFull)
    }
}

impl FromStr for TlsMode {
    type Err = TpccError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(TlsMode::Disable),
            "allow" => Ok(TlsMode::Allow),
            "prefer" => Ok(TlsMode::Prefer),
            "require" => Ok(TlsMode::Require),
            "verify-ca" => Ok(TlsMode::VerifyCa),
            "verify-full" => Ok(TlsMode::VerifyFull),
            other => Err(TpccError::Configuration(format!(
                "Invalid sslmode '{}'. Expected one of: disable, allow, prefer, require, verify-ca, verify-full",
                other
            ))),
        }
    }
}

/// Configuration for TLS/SSL database connections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// TLS mode determining the level of security
    pub mode: TlsMode,
    /// Path to the CA certificate file for server verification
    pub ca_cert: Option<PathBuf>,
    /// Path to the client certificate file for mutual TLS
    pub client_cert: Option<PathBuf>,
    /// Path to the client private key file for mutual TLS
    pub client_key: Option<PathBuf>,
}

impl TlsConfig {
    /// Create a new TLS configuration with the specified mode
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Create a disabled TLS configuration
    pub fn disabled() -> Self {
        Self::new(TlsMode::Disable)
    }

    /// Set the CA certificate path for server verification
    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Set the client certificate for mutual TLS authentication
    pub fn client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    /// Split a connection string into its TLS settings and the remaining
    /// string with the TLS parameters removed.
    ///
    /// Accepts both URL (`postgresql://...?sslmode=...`) and key/value
    /// (`host=... sslmode=...`) forms.
    pub fn from_connection_string(conn_str: &str) -> Result<(TlsConfig, String)> {
        let trimmed = conn_str.trim();
        let is_url = trimmed.starts_with("postgresql://") || trimmed.starts_with("postgres://");

        let mut config = TlsConfig::default();
        let remaining = if is_url {
            match trimmed.split_once('?') {
                Some((base, query)) => {
                    let mut kept = Vec::new();
                    for pair in query.split('&').filter(|p| !p.is_empty()) {
                        // Keep unconsumed pairs in their original encoding
                        let consumed = match form_urlencoded::parse(pair.as_bytes()).next() {
                            Some((key, value)) => config.absorb(&key, &value)?,
                            None => false,
                        };
                        if !consumed {
                            kept.push(pair);
                        }
                    }
                    if kept.is_empty() {
                        base.to_string()
                    } else {
                        format!("{}?{}", base, kept.join("&"))
                    }
                }
                None => trimmed.to_string(),
            }
        } else {
            let mut kept = Vec::new();
            for token in trimmed.split_whitespace() {
                let (key, value) = token.split_once('=').unwrap_or((token, ""));
                if !config.absorb(key, value.trim_matches('\''))? {
                    kept.push(token);
                }
            }
            kept.join(" ")
        };

        config.validate()?;
        Ok((config, remaining))
    }

    /// Record a TLS parameter. Returns false when `key` is not a TLS parameter.
    fn absorb(&mut self, key: &str, value: &str) -> Result<bool> {
        if !TLS_PARAMS.contains(&key) {
            return Ok(false);
        }
        match key {
            "sslmode" => self.mode = value.parse()?,
            "sslrootcert" => self.ca_cert = Some(PathBuf::from(value)),
            "sslcert" => self.client_cert = Some(PathBuf::from(value)),
            "sslkey" => self.client_key = Some(PathBuf::from(value)),
            _ => {}
        }
        Ok(true)
    }

    /// Validate the TLS configuration
    ///
    /// Verifying modes without a CA file fall back to the system trust store.
    pub fn validate(&self) -> Result<()> {
        if let Some(ca_cert) = &self.ca_cert
            && ca_cert.as_os_str().is_empty()
        {
            return Err(TpccError::Configuration(
                "CA certificate path cannot be empty".to_string(),
            ));
        }

        if let Some(client_cert) = &self.client_cert
            && client_cert.as_os_str().is_empty()
        {
            return Err(TpccError::Configuration(
                "Client certificate path cannot be empty".to_string(),
            ));
        }

        if let Some(client_key) = &self.client_key
            && client_key.as_os_str().is_empty()
        {
            return Err(TpccError::Configuration(
                "Client key path cannot be empty".to_string(),
            ));
        }

        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(TpccError::Configuration(
                "Client certificate and client key must be provided together".to_string(),
            ));
        }

        Ok(())
    }
}
