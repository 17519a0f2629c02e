//! TLS plumbing for the QUIC messenger adapter.
//!
//! Self-signed X.509 from the node's Ed25519 keypair via rcgen. The client
//! side skips certificate verification: visor identity is carried by the
//! channel preamble and authenticated by the messaging system proper, which
//! is outside this crate.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SetupError;

/// ALPN protocol identifier.
pub const ALPN_SKEIN_SETUP: &[u8] = b"skein-setup/1";

/// SNI placeholder; never verified.
pub const SERVER_NAME: &str = "skein-setup.local";

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn transport_config() -> Result<quinn::TransportConfig, SetupError> {
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        quinn::IdleTimeout::try_from(IDLE_TIMEOUT)
            .map_err(|e| SetupError::Internal(format!("idle timeout out of bounds: {e}")))?,
    ));
    transport.keep_alive_interval(Some(KEEPALIVE_INTERVAL));
    Ok(transport)
}

/// Build the QUIC server config: self-signed cert from the node's PKCS#8
/// Ed25519 document.
pub fn server_config(pkcs8_der: &[u8]) -> Result<quinn::ServerConfig, SetupError> {
    let pkcs8_key = rustls::pki_types::PrivatePkcs8KeyDer::from(pkcs8_der.to_vec());
    let key_pair = rcgen::KeyPair::from_pkcs8_der_and_sign_algo(&pkcs8_key, &rcgen::PKCS_ED25519)
        .map_err(|e| SetupError::Internal(format!("tls keypair: {e}")))?;

    let mut params = rcgen::CertificateParams::new(vec![SERVER_NAME.to_string()])
        .map_err(|e| SetupError::Internal(format!("tls cert params: {e}")))?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "skein-setup");
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| SetupError::Internal(format!("tls self-sign: {e}")))?;

    let cert_der = rustls::pki_types::CertificateDer::from(cert.der().to_vec());
    let key_der = rustls::pki_types::PrivateKeyDer::try_from(pkcs8_der.to_vec())
        .map_err(|e| SetupError::Internal(format!("invalid private key DER: {e}")))?;

    let mut server_crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .map_err(|e| SetupError::Internal(format!("tls server config: {e}")))?;
    server_crypto.alpn_protocols = vec![ALPN_SKEIN_SETUP.to_vec()];

    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
            .map_err(|e| SetupError::Internal(format!("quic server config: {e}")))?,
    ));
    server_config.transport_config(Arc::new(transport_config()?));
    Ok(server_config)
}

/// Build the QUIC client config used for every outbound dial.
pub fn client_config() -> Result<quinn::ClientConfig, SetupError> {
    let mut client_crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
        .with_no_client_auth();
    client_crypto.alpn_protocols = vec![ALPN_SKEIN_SETUP.to_vec()];

    let mut client_config = quinn::ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(client_crypto)
            .map_err(|e| SetupError::Internal(format!("quic client config: {e}")))?,
    ));
    client_config.transport_config(Arc::new(transport_config()?));
    Ok(client_config)
}

/// Accepts any server certificate; peer identity is not a TLS concern here.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![rustls::SignatureScheme::ED25519]
    }
}
