//! XChaCha20-Poly1305 AEAD.
//!
//! Two usage modes:
//! - `encrypt`/`decrypt`: general purpose, random 24-byte nonce prepended to
//!   the wire format (`nonce || ciphertext || tag`).
//! - `encrypt_slot`/`decrypt_slot`: the pigeonhole ratchet's per-slot mode.
//!   Per spec.md §4.1 the nonce is the deterministic all-zero nonce, which is
//!   sound here because every slot key is used exactly once.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

const ZERO_NONCE: [u8; 24] = [0u8; 24];

pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, chacha20poly1305::aead::Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;
    let mut out = Vec::with_capacity(24 + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < 24 {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(24);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(nonce, chacha20poly1305::aead::Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt one pigeonhole slot with the deterministic zero nonce. `key` must
/// never be reused across slots — the ratchet guarantees this.
pub fn encrypt_slot(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = XNonce::from_slice(&ZERO_NONCE);
    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)
}

pub fn decrypt_slot(key: &[u8; 32], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;
    let nonce = XNonce::from_slice(&ZERO_NONCE);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Pad `payload` to exactly `PH_MESSAGE_LENGTH` bytes so every pigeonhole
/// slot is indistinguishable in size (spec.md §3, §4.1): a 4-byte
/// little-endian length prefix followed by the payload and zero filler.
pub fn pad(payload: &[u8], target_len: usize) -> Result<Vec<u8>, CryptoError> {
    if payload.len() + 4 > target_len {
        return Err(CryptoError::InvalidKey(format!(
            "payload of {} bytes does not fit in {} byte slot",
            payload.len(),
            target_len
        )));
    }
    let mut out = Vec::with_capacity(target_len);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(target_len, 0u8);
    Ok(out)
}

pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if padded.len() < 4 {
        return Err(CryptoError::InvalidKey("padded slot too short".into()));
    }
    let (len_bytes, rest) = padded.split_at(4);
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    if len > rest.len() {
        return Err(CryptoError::InvalidKey("corrupt padding length".into()));
    }
    Ok(rest[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_then_unpad_roundtrip() {
        let payload = b"hello pigeonhole";
        let padded = pad(payload, 64).unwrap();
        assert_eq!(padded.len(), 64);
        assert_eq!(unpad(&padded).unwrap(), payload);
    }

    #[test]
    fn slot_roundtrip() {
        let key = [7u8; 32];
        let ct = encrypt_slot(&key, b"payload").unwrap();
        let pt = decrypt_slot(&key, &ct).unwrap();
        assert_eq!(&pt[..], b"payload");
    }

    #[test]
    fn general_roundtrip() {
        let key = [3u8; 32];
        let ct = encrypt(&key, b"hi", b"aad").unwrap();
        let pt = decrypt(&key, &ct, b"aad").unwrap();
        assert_eq!(&pt[..], b"hi");
    }
}
