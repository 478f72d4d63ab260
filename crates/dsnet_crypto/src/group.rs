//! Shared Ristretto255 group helpers used by `blindsign` and `oprf`.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand_core::RngCore;
use sha2::{Digest, Sha512};

pub fn random_scalar() -> Scalar {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order_wide(&bytes)
}

/// Hash arbitrary bytes onto the Ristretto255 group (elligator, via the
/// uniform-bytes constructor) — the `H(·)` in `P_i = s · H(mention_i)`.
pub fn hash_to_point(data: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(b"dsnet-oprf-hash-to-group-v1");
    hasher.update(data);
    RistrettoPoint::from_hash(hasher)
}
