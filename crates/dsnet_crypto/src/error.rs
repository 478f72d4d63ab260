use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    AeadDecrypt,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("ratchet step failed: {0}")]
    RatchetStep(String),

    #[error("blind signature error: {0}")]
    BlindSignature(String),

    #[error("oprf error: {0}")]
    Oprf(String),

    #[error("cuckoo filter error: {0}")]
    CuckooFilter(String),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
