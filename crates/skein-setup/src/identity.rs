//! Ed25519 node identity assembled from the configured secret-key seed.
//!
//! The PKCS#8 document is kept around for TLS certificate generation in the
//! QUIC messenger adapter.

use ring::signature::{Ed25519KeyPair, KeyPair};
use skein_routing::{PublicKey, SecretKey};

use crate::error::SetupError;

/// PKCS#8 v1 header for an Ed25519 private key (RFC 5958 / RFC 8410):
/// version, AlgorithmIdentifier id-Ed25519, and the OCTET STRING framing
/// that precedes the 32-byte seed.
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
    0x20,
];

pub struct NodeIdentity {
    pkcs8: Vec<u8>,
    public: PublicKey,
}

impl NodeIdentity {
    /// Derive the identity from a raw Ed25519 seed.
    pub fn from_seed(seckey: &SecretKey) -> Result<Self, SetupError> {
        let mut pkcs8 = Vec::with_capacity(PKCS8_ED25519_PREFIX.len() + 32);
        pkcs8.extend_from_slice(&PKCS8_ED25519_PREFIX);
        pkcs8.extend_from_slice(seckey.as_bytes());

        let keypair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(&pkcs8)
            .map_err(|e| SetupError::Policy(format!("invalid secret key: {e}")))?;

        let mut public = [0u8; 32];
        public.copy_from_slice(keypair.public_key().as_ref());

        Ok(Self { pkcs8, public: PublicKey::from_bytes(public) })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// PKCS#8 DER bytes, for TLS certificate generation.
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }
}
