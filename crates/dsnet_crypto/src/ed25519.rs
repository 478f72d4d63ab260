//! Ed25519 token-binding subkeys.
//!
//! `spec.md` uses Ed25519 only for one thing: the one-time signing subkey
//! bound to an `AbeToken`, used to sign `(Qk.public || payload)` on query
//! issuance (§4.3) so the responder can check that whoever redeemed the
//! blind signature also authored this particular query.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::CryptoError;

pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.signing_key.sign(msg).to_bytes()
    }
}

/// Verify a detached signature against a raw 32-byte public key.
pub fn verify(public: &[u8; 32], msg: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(public)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = Signature::from_bytes(signature);
    vk.verify(msg, &sig)
        .map_err(|_| CryptoError::SignatureVerification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"query-payload");
        verify(&kp.public_bytes(), b"query-payload", &sig).unwrap();
    }

    #[test]
    fn tampered_message_fails() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"query-payload");
        assert!(verify(&kp.public_bytes(), b"different-payload", &sig).is_err());
    }
}
