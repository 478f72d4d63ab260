//! dsnet_crypto — cryptographic primitives for the anonymous
//! search-and-messaging client.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - All public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `x25519`    — ECDH key agreement for conversation setup
//! - `ed25519`   — signing keys for token subkey binding
//! - `ratchet`   — pigeonhole ratchet (two independent per-direction chains)
//! - `aead`      — XChaCha20-Poly1305 encrypt/decrypt helpers, slot padding
//! - `kdf`       — HKDF-SHA256 key derivation
//! - `hash`      — BLAKE3 utilities (addresses, short ids)
//! - `group`     — shared Ristretto255 helpers (`blindsign`, `oprf`)
//! - `blindsign` — Abe-style blind Schnorr signatures (query tokens)
//! - `oprf`      — scalar-multiplication OPRF (MSPSI)
//! - `cuckoo`    — cuckoo-filter-backed publication sets (MSPSI)
//! - `error`     — unified error type

pub mod aead;
pub mod blindsign;
pub mod cuckoo;
pub mod ed25519;
pub mod error;
pub mod group;
pub mod hash;
pub mod kdf;
pub mod oprf;
pub mod ratchet;
pub mod x25519;

pub use error::CryptoError;
pub use ratchet::PH_MESSAGE_LENGTH;
