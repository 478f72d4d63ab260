//! Query construction, token binding and broadcast fan-out (spec.md §4.3,
//! C5's issuance half — `TokenManager` owns acquisition/popping, this
//! module owns turning a popped token into a broadcast `Query` frame).

use curve25519_dalek::scalar::Scalar;

use dsnet_crypto::x25519::KeyPair;
use dsnet_crypto::oprf;
use dsnet_proto::api;
use dsnet_proto::wire::{CleartextQueryPayload, Query};
use dsnet_store::SqliteRepository;

use crate::config::QueryType;
use crate::conversation::Conversation;
use crate::error::ClientError;
use crate::mspsi;
use crate::token::TokenManager;

/// Result of issuing one query: how many peers the broadcast reached.
pub struct IssuedQuery {
    pub nb_sent: usize,
}

pub struct QueryIssuer {
    http: reqwest::Client,
    server_url: String,
    repository: SqliteRepository,
}

impl QueryIssuer {
    pub fn new(http: reqwest::Client, server_url: String, repository: SqliteRepository) -> Self {
        Self {
            http,
            server_url,
            repository,
        }
    }

    /// Full query-issuance flow (spec.md §4.3 steps 1-6):
    ///
    /// 1. Pop an unconsumed token (`NO_TOKEN` if none remain — raised
    ///    before any conversation is persisted or any broadcast is made).
    /// 2. Generate an ephemeral query keypair `Qk`.
    /// 3. Encode the payload for `query_type`.
    /// 4. Persist one `Conversation` per peer, own key included
    ///    (spec.md §4.2's self-peer tie-break).
    /// 5. Sign `(Qk.public ‖ payload)` with the token's Ed25519 subkey.
    /// 6. Broadcast once to `/bb/broadcast`.
    pub async fn issue(
        &self,
        token_manager: &TokenManager,
        keywords: &[String],
        query_type: QueryType,
        peers: &[[u8; 32]],
    ) -> Result<IssuedQuery, ClientError> {
        let token = token_manager.pop_token().await?;

        let query_keypair = KeyPair::generate();
        let (payload, query_mspsi_secret) = encode_payload(keywords, query_type)?;

        for peer in peers {
            let id = format!("{}:{}", hex::encode(query_keypair.public_bytes()), hex::encode(peer));
            let conversation = Conversation::create_from_querier(
                id,
                query_keypair.secret_bytes(),
                *peer,
                payload.clone(),
                query_type,
                query_mspsi_secret,
            );
            self.repository.save_conversation(&conversation.to_upsert()).await?;
        }

        let mut signed = Vec::with_capacity(32 + payload.len());
        signed.extend_from_slice(&query_keypair.public_bytes());
        signed.extend_from_slice(&payload);
        let signature = token.subkey.sign(&signed);

        let query = Query {
            public_key: query_keypair.public_bytes(),
            token_public_key: token.subkey.public_bytes(),
            blind_signature: token.blind_signature.to_bytes(),
            ed25519_signature: signature,
            payload,
        };

        let resp = self
            .http
            .post(format!("{}/bb/broadcast", self.server_url))
            .body(query.encode())
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::TransportTransient(format!("broadcast returned {}", resp.status())));
        }

        tracing::debug!(target: "dsnet_client", event = "query_broadcast", peers = peers.len());
        Ok(IssuedQuery { nb_sent: peers.len() })
    }
}

/// Encode the query payload per spec.md §4.3 step 3. DPSI additionally
/// returns the blinding scalar `s_q`, which every prospective conversation
/// stores as `query_mspsi_secret` to later decode the responder's reply.
fn encode_payload(keywords: &[String], query_type: QueryType) -> Result<(Vec<u8>, Option<Scalar>), ClientError> {
    match query_type {
        QueryType::Cleartext => {
            let payload = api::to_msgpack(&CleartextQueryPayload {
                keywords: keywords.to_vec(),
            })?;
            Ok((payload, None))
        }
        QueryType::Dpsi => {
            let (s_q, blinded) = mspsi::query(keywords);
            let compressed: Vec<[u8; 32]> = blinded.iter().map(oprf::compress).collect();
            let payload = api::to_msgpack(&compressed)?;
            Ok((payload, Some(s_q)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleartext_payload_decodes_back_to_keywords() {
        let keywords = vec!["foo".to_string(), "bar".to_string()];
        let (payload, secret) = encode_payload(&keywords, QueryType::Cleartext).unwrap();
        assert!(secret.is_none());
        let decoded: CleartextQueryPayload = api::from_msgpack(&payload).unwrap();
        assert_eq!(decoded.keywords, keywords);
    }

    #[test]
    fn dpsi_payload_carries_a_blinding_secret() {
        let keywords = vec!["foo".to_string()];
        let (payload, secret) = encode_payload(&keywords, QueryType::Dpsi).unwrap();
        assert!(secret.is_some());
        let decoded: Vec<[u8; 32]> = api::from_msgpack(&payload).unwrap();
        assert_eq!(decoded.len(), 1);
    }
}
