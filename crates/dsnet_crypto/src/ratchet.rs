//! Pigeonhole ratchet (spec.md §4.1, component C2).
//!
//! Given a conversation's shared ECDH secret `S`, each direction derives an
//! independent chain of `(address, aeadKey)` pairs keyed only by a
//! monotonically increasing counter — there is no DH-ratchet step here: the
//! shared secret is fixed for the conversation's lifetime, unlike a full
//! Signal Double Ratchet. Both sides derive the same `address_n` because
//! both hold the same `S` and agree on direction tags.

use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::{hash, kdf};

/// Ciphertext payload length for every pigeonhole slot (spec.md §3's
/// `PH_MESSAGE_LENGTH`) — fixed so the server sees indistinguishable sizes.
pub const PH_MESSAGE_LENGTH: usize = 512;

/// Which of the two independent chains a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    QuerierToResponder,
    ResponderToQuerier,
}

impl Direction {
    fn tag(self) -> &'static [u8] {
        match self {
            Direction::QuerierToResponder => b"Q2R",
            Direction::ResponderToQuerier => b"R2Q",
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::QuerierToResponder => Direction::ResponderToQuerier,
            Direction::ResponderToQuerier => Direction::QuerierToResponder,
        }
    }
}

/// Everything derived for one pigeonhole slot.
#[derive(Clone)]
pub struct PigeonholeSlot {
    pub address: [u8; 32],
    pub aead_key: [u8; 32],
    /// Retained by the receiver so it can recompute `address` without
    /// re-running HKDF from `S` (spec.md §3: "keyForHash_n = slotKey_n").
    pub key_for_hash: [u8; 32],
}

impl Drop for PigeonholeSlot {
    fn drop(&mut self) {
        self.aead_key.zeroize();
        self.key_for_hash.zeroize();
    }
}

/// `slotKey_n = HKDF-Expand(S, info = D ‖ "slot" ‖ n, L = 32)`.
fn derive_slot_key(shared_secret: &[u8; 32], direction: Direction, counter: u64) -> Result<[u8; 32], CryptoError> {
    let mut info = Vec::with_capacity(3 + 4 + 8);
    info.extend_from_slice(direction.tag());
    info.extend_from_slice(b"slot");
    info.extend_from_slice(&counter.to_be_bytes());
    let mut slot_key = [0u8; 32];
    kdf::hkdf_expand(shared_secret, None, &info, &mut slot_key)?;
    Ok(slot_key)
}

/// Given a slot key (== `keyForHash`), recompute `address` and `aeadKey`.
/// This is the path a receiver normally takes after loading a persisted
/// `PigeonHole` row: it never needs `S` again.
pub fn slot_from_key_for_hash(key_for_hash: &[u8; 32]) -> Result<PigeonholeSlot, CryptoError> {
    let mut addr_input = Vec::with_capacity(32 + 4);
    addr_input.extend_from_slice(key_for_hash);
    addr_input.extend_from_slice(b"addr");
    let address = hash::hash(&addr_input);

    let mut aead_key = [0u8; 32];
    kdf::hkdf_expand(key_for_hash, None, b"enc", &mut aead_key)?;

    Ok(PigeonholeSlot {
        address,
        aead_key,
        key_for_hash: *key_for_hash,
    })
}

/// One direction of the ratchet: the shared secret, the direction tag, and
/// the next slot counter to hand out.
pub struct PigeonholeRatchet {
    shared_secret: [u8; 32],
    direction: Direction,
    next_counter: u64,
}

impl Drop for PigeonholeRatchet {
    fn drop(&mut self) {
        self.shared_secret.zeroize();
    }
}

impl PigeonholeRatchet {
    pub fn new(shared_secret: [u8; 32], direction: Direction) -> Self {
        Self {
            shared_secret,
            direction,
            next_counter: 0,
        }
    }

    pub fn with_counter(shared_secret: [u8; 32], direction: Direction, next_counter: u64) -> Self {
        Self {
            shared_secret,
            direction,
            next_counter,
        }
    }

    pub fn counter(&self) -> u64 {
        self.next_counter
    }

    /// Derive the slot at an arbitrary counter without advancing state —
    /// used to open listening addresses ahead of the current position.
    pub fn slot_at(&self, counter: u64) -> Result<PigeonholeSlot, CryptoError> {
        let slot_key = derive_slot_key(&self.shared_secret, self.direction, counter)?;
        slot_from_key_for_hash(&slot_key)
    }

    /// Derive and return the next unconsumed slot, advancing the counter.
    pub fn advance(&mut self) -> Result<PigeonholeSlot, CryptoError> {
        let slot = self.slot_at(self.next_counter)?;
        self.next_counter += 1;
        Ok(slot)
    }

    /// Encrypt a padded pigeonhole message for the next slot, returning the
    /// slot (to persist/listen on) and the fixed-length ciphertext.
    pub fn encrypt_next(&mut self, plaintext: &[u8]) -> Result<(PigeonholeSlot, Vec<u8>), CryptoError> {
        let slot = self.advance()?;
        let padded = crate::aead::pad(plaintext, PH_MESSAGE_LENGTH)?;
        let ciphertext = crate::aead::encrypt_slot(&slot.aead_key, &padded)?;
        Ok((slot, ciphertext))
    }

    /// Decrypt a ciphertext known to belong to `slot`.
    pub fn decrypt(slot: &PigeonholeSlot, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let padded = crate::aead::decrypt_slot(&slot.aead_key, ciphertext)?;
        crate::aead::unpad(&padded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_same_address() {
        let shared = [9u8; 32];
        let querier_out = PigeonholeRatchet::new(shared, Direction::QuerierToResponder);
        let responder_in = PigeonholeRatchet::new(shared, Direction::QuerierToResponder);

        let s1 = querier_out.slot_at(0).unwrap();
        let s2 = responder_in.slot_at(0).unwrap();
        assert_eq!(s1.address, s2.address);
        assert_eq!(s1.aead_key, s2.aead_key);
    }

    #[test]
    fn chains_are_independent() {
        let shared = [9u8; 32];
        let q2r = PigeonholeRatchet::new(shared, Direction::QuerierToResponder);
        let r2q = PigeonholeRatchet::new(shared, Direction::ResponderToQuerier);
        assert_ne!(q2r.slot_at(0).unwrap().address, r2q.slot_at(0).unwrap().address);
    }

    #[test]
    fn encrypt_then_decrypt_roundtrip() {
        let shared = [5u8; 32];
        let mut sender = PigeonholeRatchet::new(shared, Direction::QuerierToResponder);
        let (slot, ct) = sender.encrypt_next(b"results").unwrap();
        let pt = PigeonholeRatchet::decrypt(&slot, &ct).unwrap();
        assert_eq!(pt, b"results");
    }

    #[test]
    fn counter_advances_monotonically() {
        let mut r = PigeonholeRatchet::new([1u8; 32], Direction::QuerierToResponder);
        let a0 = r.advance().unwrap();
        let a1 = r.advance().unwrap();
        assert_ne!(a0.address, a1.address);
        assert_eq!(r.counter(), 2);
    }
}
