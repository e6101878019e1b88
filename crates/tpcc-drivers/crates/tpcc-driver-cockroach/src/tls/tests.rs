//! Tests for CockroachDB TLS support

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;
use tpcc_core::security::{TlsConfig, TlsMode};

// Valid PEM framing around a body that is not a real certificate
const FAKE_CERT_PEM: &[u8] = b"-----BEGIN CERTIFICATE-----
MIIBkTCB+wIJAKHBfpGqoAAAMA0GCSqGSIb3DQEBCwUAMBExDzANBgNVBAMMBnRl
c3RjYTAeFw0yNDAxMDEwMDAwMDBaFw0yNTAxMDEwMDAwMDBaMBExDzANBgNVBAMM
-----END CERTIFICATE-----
";

fn create_temp_file_with_content(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

// =============================================================================
// Negotiation Mode Tests
// =============================================================================

#[test]
fn test_negotiation_mode_disable() {
    assert!(matches!(negotiation_mode(TlsMode::Disable), SslMode::Disable));
}

#[test]
fn test_negotiation_mode_opportunistic() {
    assert!(matches!(negotiation_mode(TlsMode::Allow), SslMode::Prefer));
    assert!(matches!(negotiation_mode(TlsMode::Prefer), SslMode::Prefer));
}

#[test]
fn test_negotiation_mode_required() {
    assert!(matches!(negotiation_mode(TlsMode::Require), SslMode::Require));
    assert!(matches!(negotiation_mode(TlsMode::VerifyCa), SslMode::Require));
    assert!(matches!(negotiation_mode(TlsMode::VerifyFull), SslMode::Require));
}

// =============================================================================
// Build Connector Tests
// =============================================================================

#[test]
fn test_is_disabled() {
    assert!(CockroachTlsConnector::is_disabled(&TlsConfig::disabled()));
    assert!(!CockroachTlsConnector::is_disabled(&TlsConfig::default()));
}

#[test]
fn test_build_connector_fails_for_disable_mode() {
    let result = CockroachTlsConnector::build(&TlsConfig::disabled());
    let err = result.err().unwrap();
    assert!(err.to_string().contains("not supported"));
}

#[test]
fn test_build_connector_without_certs() {
    for mode in [TlsMode::Allow, TlsMode::Prefer, TlsMode::Require, TlsMode::VerifyFull] {
        let result = CockroachTlsConnector::build(&TlsConfig::new(mode));
        assert!(result.is_ok(), "mode {:?} should build", mode);
    }
}

#[test]
fn test_build_connector_missing_ca_file() {
    let config = TlsConfig::new(TlsMode::VerifyFull).ca_cert("/nonexistent/ca.crt");
    let err = CockroachTlsConnector::build(&config).err().unwrap();
    assert!(matches!(err, TlsError::CaCertLoadFailed { .. }));
}

#[test]
fn test_build_connector_rejects_unpaired_client_cert() {
    let mut config = TlsConfig::new(TlsMode::Require);
    config.client_cert = Some("/c/client.crt".into());
    let err = CockroachTlsConnector::build(&config).err().unwrap();
    assert!(matches!(err, TlsError::ConfigurationError(_)));
}

// =============================================================================
// Certificate Loading Tests
// =============================================================================

#[test]
fn test_apply_ca_cert_file_not_found() {
    let mut builder = NativeTlsConnector::builder();
    let result = apply_ca_cert(&mut builder, Path::new("/nonexistent/path/to/ca.crt"));

    let err_msg = result.unwrap_err().to_string();
    assert!(err_msg.contains("Failed to load CA certificate"));
}

#[test]
fn test_apply_ca_cert_invalid_format() {
    let temp_file = create_temp_file_with_content(b"not a valid certificate");
    let mut builder = NativeTlsConnector::builder();
    let result = apply_ca_cert(&mut builder, temp_file.path());

    let err_msg = result.unwrap_err().to_string();
    assert!(err_msg.contains("Invalid CA certificate"));
}

#[test]
fn test_apply_client_cert_file_not_found() {
    let mut builder = NativeTlsConnector::builder();
    let result = apply_client_cert(
        &mut builder,
        Path::new("/nonexistent/client.crt"),
        Path::new("/nonexistent/client.key"),
    );

    let err_msg = result.unwrap_err().to_string();
    assert!(err_msg.contains("Failed to load client certificate"));
}

#[test]
fn test_apply_client_cert_invalid_key() {
    let cert_file = create_temp_file_with_content(FAKE_CERT_PEM);
    let key_file = create_temp_file_with_content(b"not a valid key");

    let mut builder = NativeTlsConnector::builder();
    let result = apply_client_cert(&mut builder, cert_file.path(), key_file.path());

    let err_msg = result.unwrap_err().to_string();
    assert!(err_msg.contains("Invalid client identity"));
}

#[test]
fn test_configure_verification_disable_fails() {
    let mut builder = NativeTlsConnector::builder();
    let result = configure_verification(&mut builder, &TlsConfig::disabled());
    assert!(result.is_err());
}

#[test]
fn test_tls_error_converts_to_configuration_error() {
    let err: TpccError = TlsError::InvalidCaCert("bad format".to_string()).into();
    assert!(matches!(err, TpccError::Configuration(ref m) if m.contains("Invalid CA certificate format")));
}
