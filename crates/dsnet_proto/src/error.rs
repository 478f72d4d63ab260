use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unknown wire tag byte: {0}")]
    UnknownTag(u8),
    #[error("frame tag did not match the decoder called")]
    UnexpectedTag,
    #[error("frame truncated: {0}")]
    Truncated(&'static str),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("MessagePack encode/decode error: {0}")]
    MessagePack(String),
}
