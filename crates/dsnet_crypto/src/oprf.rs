//! Scalar-multiplication OPRF for MSPSI (spec.md §4.7, component C8).
//!
//! Data-owner side: `P_i = s_pub · H(mention_i)`.
//! Querier side: `Q_j = s_q · H(kwd_j)`, then after the data owner replies
//! with `s_pub · Q_j`, the querier multiplies by `s_q⁻¹` to recover
//! `s_pub · H(kwd_j)` — the same point the data owner inserted into its
//! cuckoo filter under a matching keyword.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

use crate::error::CryptoError;
use crate::group::{hash_to_point, random_scalar};

/// A fresh per-query or per-publication blinding scalar.
pub fn sample_scalar() -> Scalar {
    random_scalar()
}

/// `s · H(item)`.
pub fn evaluate(s: &Scalar, item: &[u8]) -> RistrettoPoint {
    s * hash_to_point(item)
}

/// `s · point` — used by the data owner to answer a blinded query point,
/// and by the querier to re-blind with its own scalar.
pub fn scalar_mult(s: &Scalar, point: &RistrettoPoint) -> RistrettoPoint {
    s * point
}

/// Remove the querier's blinding: `s⁻¹ · point`.
pub fn unblind(s: &Scalar, point: &RistrettoPoint) -> RistrettoPoint {
    s.invert() * point
}

pub fn compress(point: &RistrettoPoint) -> [u8; 32] {
    point.compress().to_bytes()
}

pub fn decompress(bytes: &[u8; 32]) -> Result<RistrettoPoint, CryptoError> {
    CompressedRistretto::from_slice(bytes)
        .map_err(|e| CryptoError::Oprf(e.to_string()))?
        .decompress()
        .ok_or_else(|| CryptoError::Oprf("invalid OPRF point encoding".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oprf_round_trip_recovers_same_point() {
        // Data owner's publication-time scalar and the value it "signs".
        let s_pub = sample_scalar();
        let kwd = b"foo";
        let published = evaluate(&s_pub, kwd);

        // Querier blinds the same keyword with its own scalar.
        let s_q = sample_scalar();
        let blinded_query = evaluate(&s_q, kwd);

        // Data owner evaluates the blinded query with its scalar.
        let blinded_reply = scalar_mult(&s_pub, &blinded_query);

        // Querier removes its own blinding.
        let recovered = unblind(&s_q, &blinded_reply);

        assert_eq!(compress(&recovered), compress(&published));
    }

    #[test]
    fn different_keywords_give_different_points() {
        let s = sample_scalar();
        assert_ne!(compress(&evaluate(&s, b"foo")), compress(&evaluate(&s, b"bar")));
    }
}
