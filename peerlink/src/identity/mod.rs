//! Node key identity.
//!
//! Each process generates one key pair at startup and announces the public
//! half to peers during discovery. The private key never leaves this type.

use crate::error::{PeerlinkError, Result};
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

/// Signature algorithm used for node identities.
pub const KEY_ALGORITHM: &str = "Ed25519";

/// Hex characters kept in a fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// A node's key pair plus its cached textual public key.
pub struct KeyIdentity {
    signing_key: SigningKey,
    public_key_pem: String,
    fingerprint: String,
}

impl KeyIdentity {
    /// Generates a fresh key pair from the OS random source.
    ///
    /// The PEM encoding is computed once here so that
    /// [`public_key_text`](Self::public_key_text) cannot fail afterwards.
    pub fn generate() -> Result<Self> {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self::from_secret_bytes(&secret)
    }

    pub(crate) fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();

        let public_key_pem = verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| PeerlinkError::Identity(format!("PEM encoding failed: {}", e)))?;
        let der = verifying_key
            .to_public_key_der()
            .map_err(|e| PeerlinkError::Identity(format!("DER encoding failed: {}", e)))?;

        let digest = Sha256::digest(der.as_bytes());
        let mut fingerprint = hex::encode(digest);
        fingerprint.truncate(FINGERPRINT_LEN);

        tracing::debug!("generated {} identity {}", KEY_ALGORITHM, fingerprint);

        Ok(Self {
            signing_key,
            public_key_pem,
            fingerprint,
        })
    }

    /// Public key as PEM-encoded SubjectPublicKeyInfo.
    pub fn public_key_text(&self) -> &str {
        &self.public_key_pem
    }

    /// Short hex digest of the public key, for logs and display.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn algorithm(&self) -> &'static str {
        KEY_ALGORITHM
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl fmt::Debug for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyIdentity")
            .field("algorithm", &KEY_ALGORITHM)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
