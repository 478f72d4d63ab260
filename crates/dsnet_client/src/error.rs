//! Error taxonomy (spec.md §7). Each variant's doc comment states its
//! handling policy; callers should match on these rather than stringly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// `popToken` returned empty. Raise to caller.
    #[error("no query token available")]
    NoToken,

    /// Token server refused, or returned the wrong content type. Raise.
    #[error("invalid authorization response from token server: {0}")]
    InvalidAuthorizationResponse(String),

    /// Inbound query failed blind-signature or Ed25519 verification.
    /// Log and drop, never persist.
    #[error("signature invalid")]
    SignatureInvalid,

    /// AEAD tag mismatch on a pigeonhole fetch. Log at debug, drop.
    #[error("decrypt failure")]
    DecryptFailure,

    /// Connection refused, DNS failure, 5xx. Retried with backoff by the
    /// coordinator; propagated as-is from one-shot calls.
    #[error("transient transport error: {0}")]
    TransportTransient(String),

    /// Duplicate insert. Swallowed by callers — insert-ignore is intended,
    /// this variant exists so a caller can choose to log it.
    #[error("integrity violation (duplicate): {0}")]
    IntegrityViolation(String),

    /// `MAX_ERRORS` consecutive coordinator errors reached. Raise and stop
    /// the client.
    #[error("fatal: too many consecutive errors ({0})")]
    Fatal(u32),

    #[error(transparent)]
    Crypto(#[from] dsnet_crypto::CryptoError),

    #[error(transparent)]
    Proto(#[from] dsnet_proto::ProtoError),

    #[error(transparent)]
    Store(#[from] dsnet_store::StoreError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
