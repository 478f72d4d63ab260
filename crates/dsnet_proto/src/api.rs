//! Request/response DTOs for the bulletin-board and token-server HTTP
//! surfaces (spec §6). These are serialised as MessagePack on the wire
//! except `ServerInfo`, which the bulletin board serves as plain JSON.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// `GET /` on the bulletin board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub message: String,
    pub core_version: String,
    pub server_version: String,
    pub query_type: String,
}

/// `GET {tokenBase}/publickey` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPublicKeyResponse {
    /// Compressed Ristretto255 point, 32 bytes.
    pub public_key: Vec<u8>,
    pub issued_at: i64,
}

/// One entry of `POST {tokenBase}/commitments`'s response array: a
/// Schnorr commitment `R = k·G` the client can later blind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerCommitment {
    pub commitment: Vec<u8>,
}

/// One element of `POST {tokenBase}/pretokens`'s request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindedChallenge {
    pub challenge: Vec<u8>,
}

/// One element of `POST {tokenBase}/pretokens`'s response body: the
/// signer's share `s = k + e·x`, paired by position with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerResponse {
    pub share: Vec<u8>,
}

/// `POST /ph/{addressHex}` and `POST /bb/broadcast` both return this on
/// success; only the HTTP status code is semantically load-bearing, but the
/// body carries a receipt timestamp useful for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub received_at: i64,
}

pub fn to_msgpack<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    rmp_serde::to_vec_named(value).map_err(|e| ProtoError::MessagePack(e.to_string()))
}

pub fn from_msgpack<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtoError> {
    rmp_serde::from_slice(bytes).map_err(|e| ProtoError::MessagePack(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_public_key_round_trips_msgpack() {
        let resp = ServerPublicKeyResponse {
            public_key: vec![1, 2, 3],
            issued_at: 1_700_000_000,
        };
        let bytes = to_msgpack(&resp).unwrap();
        let decoded: ServerPublicKeyResponse = from_msgpack(&bytes).unwrap();
        assert_eq!(decoded.public_key, resp.public_key);
        assert_eq!(decoded.issued_at, resp.issued_at);
    }
}
