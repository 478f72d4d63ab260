//! Abe-style blind Schnorr signatures over Ristretto255.
//!
//! This is the token server's signing scheme (spec.md C1, C5): the server
//! signs a value it never sees in the clear, so it cannot link token
//! issuance to the later query that redeems it. Per spec.md §9's design
//! note the scheme is kept behind a narrow, swappable surface — every
//! function here operates on `Scalar`/`RistrettoPoint`, so a test (or an
//! alternate deployment) can substitute a toy group without touching
//! callers.
//!
//! Protocol (four messages):
//! 1. Signer picks a nonce `k`, sends commitment `R = k·G`.
//! 2. User blinds with `(alpha, beta)`: `R' = R + alpha·G + beta·X`,
//!    `e' = H(R' ‖ msg)`, sends `e = e' + beta` to the signer.
//! 3. Signer computes `s = k + e·x` and sends it back.
//! 4. User unblinds: `s' = s + alpha`. The signature is `(R', s')`.
//!
//! Verification: `s'·G == R' + e'·X` where `e' = H(R' ‖ msg)`.

use curve25519_dalek::{constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar};
use sha2::{Digest, Sha512};

use crate::error::CryptoError;
use crate::group::random_scalar;

fn hash_to_scalar(r_prime: &RistrettoPoint, msg: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(b"dsnet-abe-blindsig-v1");
    hasher.update(r_prime.compress().as_bytes());
    hasher.update(msg);
    Scalar::from_hash(hasher)
}

/// The token server's long-term signing key.
pub struct SignerKeyPair {
    secret: Scalar,
    pub public: RistrettoPoint,
}

impl SignerKeyPair {
    pub fn generate() -> Self {
        let secret = random_scalar();
        let public = secret * RISTRETTO_BASEPOINT_POINT;
        Self { secret, public }
    }

    /// Reconstruct from a stored `ServerPublicKey`-paired secret (test /
    /// server-side use only — clients never hold this).
    pub fn from_secret(secret: Scalar, public: RistrettoPoint) -> Self {
        Self { secret, public }
    }

    /// Step 1: issue a fresh per-token commitment. The nonce `k` must be
    /// kept secret by the signer until `sign` is called with the matching
    /// challenge, and used at most once.
    pub fn commit() -> (Scalar, RistrettoPoint) {
        let k = random_scalar();
        (k, k * RISTRETTO_BASEPOINT_POINT)
    }

    /// Step 3: produce the signature share for a blinded challenge.
    pub fn sign(&self, nonce: &Scalar, challenge: &Scalar) -> Scalar {
        nonce + challenge * self.secret
    }
}

/// State a client keeps between blinding a challenge and unblinding the
/// returned signature share.
pub struct BlindingState {
    alpha: Scalar,
    beta: Scalar,
    r_prime: RistrettoPoint,
}

/// Step 2: blind the signer's commitment for `msg` (the token subkey's
/// public key, in spec.md's usage).
pub fn blind(signer_public: &RistrettoPoint, commitment: &RistrettoPoint, msg: &[u8]) -> (BlindingState, Scalar) {
    let alpha = random_scalar();
    let beta = random_scalar();
    let r_prime = commitment + alpha * RISTRETTO_BASEPOINT_POINT + beta * signer_public;
    let e_prime = hash_to_scalar(&r_prime, msg);
    let challenge = e_prime + beta;
    (BlindingState { alpha, beta, r_prime }, challenge)
}

/// An unblinded, verifiable blind signature.
#[derive(Debug, Clone)]
pub struct BlindSignature {
    pub r_prime: RistrettoPoint,
    pub s_prime: Scalar,
}

impl BlindSignature {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.r_prime.compress().as_bytes());
        out[32..].copy_from_slice(self.s_prime.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, CryptoError> {
        let r_prime = curve25519_dalek::ristretto::CompressedRistretto::from_slice(&bytes[..32])
            .map_err(|e| CryptoError::BlindSignature(e.to_string()))?
            .decompress()
            .ok_or_else(|| CryptoError::BlindSignature("invalid R' point".into()))?;
        let s_bytes: [u8; 32] = bytes[32..].try_into().unwrap();
        let s_prime = Option::<Scalar>::from(Scalar::from_canonical_bytes(s_bytes))
            .ok_or_else(|| CryptoError::BlindSignature("invalid s' scalar".into()))?;
        Ok(Self { r_prime, s_prime })
    }
}

/// Step 4: unblind the signer's share into a final signature.
pub fn unblind(state: &BlindingState, share: &Scalar) -> BlindSignature {
    BlindSignature {
        r_prime: state.r_prime,
        s_prime: share + state.alpha,
    }
}

/// Verify a blind signature over `msg` against the signer's public key.
pub fn verify(signer_public: &RistrettoPoint, msg: &[u8], sig: &BlindSignature) -> bool {
    let e_prime = hash_to_scalar(&sig.r_prime, msg);
    let lhs = sig.s_prime * RISTRETTO_BASEPOINT_POINT;
    let rhs = sig.r_prime + e_prime * signer_public;
    lhs == rhs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_blind_signature_roundtrip() {
        let signer = SignerKeyPair::generate();
        let (nonce, commitment) = SignerKeyPair::commit();
        let msg = b"token-subkey-public-bytes";

        let (state, challenge) = blind(&signer.public, &commitment, msg);
        let share = signer.sign(&nonce, &challenge);
        let sig = unblind(&state, &share);

        assert!(verify(&signer.public, msg, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = SignerKeyPair::generate();
        let (nonce, commitment) = SignerKeyPair::commit();
        let msg = b"token-subkey-public-bytes";

        let (state, challenge) = blind(&signer.public, &commitment, msg);
        let share = signer.sign(&nonce, &challenge);
        let sig = unblind(&state, &share);

        assert!(!verify(&signer.public, b"different-message", &sig));
    }

    #[test]
    fn signer_cannot_link_commitment_to_final_signature() {
        // The signer only ever sees `commitment`/`challenge`/`share`; the
        // final `(r_prime, s_prime)` is unlinkable without `alpha`/`beta`,
        // which never leave the client. This test only asserts the
        // arithmetic fact that r_prime != commitment, which is necessary
        // (not sufficient) for unlinkability.
        let signer = SignerKeyPair::generate();
        let (nonce, commitment) = SignerKeyPair::commit();
        let msg = b"msg";
        let (state, challenge) = blind(&signer.public, &commitment, msg);
        let share = signer.sign(&nonce, &challenge);
        let sig = unblind(&state, &share);
        assert_ne!(sig.r_prime, commitment);
    }

    #[test]
    fn wire_roundtrip() {
        let signer = SignerKeyPair::generate();
        let (nonce, commitment) = SignerKeyPair::commit();
        let msg = b"msg";
        let (state, challenge) = blind(&signer.public, &commitment, msg);
        let share = signer.sign(&nonce, &challenge);
        let sig = unblind(&state, &share);

        let bytes = sig.to_bytes();
        let decoded = BlindSignature::from_bytes(&bytes).unwrap();
        assert!(verify(&signer.public, msg, &decoded));
    }
}
