//! X25519 keypairs for conversation establishment.
//!
//! Every `Conversation` (querier or responder) holds one ephemeral `KeyPair`;
//! the shared secret it derives with the peer's public key is the root of
//! the pigeonhole ratchet (see `ratchet`).

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// An ephemeral X25519 keypair. `secret` is not `Clone`/`Copy` by design —
/// a conversation owns exactly one.
pub struct KeyPair {
    secret: StaticSecret,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// ECDH(localSecret, otherPublic) — spec.md Conversation invariant 1.
    pub fn diffie_hellman(&self, other_public: &[u8; 32]) -> [u8; 32] {
        let other = PublicKey::from(*other_public);
        *self.secret.diffie_hellman(&other).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_agrees_both_ways() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let sa = a.diffie_hellman(&b.public_bytes());
        let sb = b.diffie_hellman(&a.public_bytes());
        assert_eq!(sa, sb);
    }
}
