//! Message retrievers (spec.md §4.6, C7): on a notification, match the
//! 3-byte address prefix against locally listened pigeonholes, then fetch
//! by full address. A probabilistic cover-fetch variant also issues decoy
//! prefix GETs on a local miss, so the server cannot distinguish "nothing
//! for me" from "fetched and discarded".

use rand::Rng;

use dsnet_proto::api;
use dsnet_proto::wire::PigeonholeMessage as WirePigeonholeMessage;

use crate::error::ClientError;

/// One fetched pigeonhole body, paired with the address it was found at.
pub type RetrievedMessage = ([u8; 32], Vec<u8>, [u8; 32]);

#[async_trait::async_trait]
pub trait MessageRetriever: Send + Sync {
    /// `candidates` are the locally listened addresses whose prefix
    /// matches the notification's `adrShortHex` — computed by the caller
    /// from `Repository::getPigeonholesByShortAddress`.
    async fn retrieve(&self, adr_short_hex: &str, candidates: &[[u8; 32]]) -> Result<Vec<RetrievedMessage>, ClientError>;
}

/// Fetches `/ph/{fullAddressHex}` for each locally listened address whose
/// prefix matches the notification (spec.md §4.6's address-match variant).
pub struct AddressMatchMessageRetriever {
    http: reqwest::Client,
    server_url: String,
}

impl AddressMatchMessageRetriever {
    pub fn new(http: reqwest::Client, server_url: String) -> Self {
        Self { http, server_url }
    }

    async fn fetch_full_address(&self, address: &[u8; 32]) -> Result<Option<(Vec<u8>, [u8; 32])>, ClientError> {
        let resp = self
            .http
            .get(format!("{}/ph/{}", self.server_url, hex::encode(address)))
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ClientError::TransportTransient(format!("ph GET returned {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        let body: WirePigeonholeMessage = dsnet_proto::wire::decode_any(&bytes)?
            .into_pigeonhole_message()
            .ok_or_else(|| ClientError::TransportTransient("ph GET returned wrong frame tag".into()))?;
        Ok(Some((body.payload, body.from_key)))
    }
}

#[async_trait::async_trait]
impl MessageRetriever for AddressMatchMessageRetriever {
    async fn retrieve(&self, adr_short_hex: &str, candidates: &[[u8; 32]]) -> Result<Vec<RetrievedMessage>, ClientError> {
        let mut out = Vec::new();
        for address in candidates.iter().filter(|a| dsnet_crypto::hash::adr_short(a) == adr_short_hex) {
            if let Some((payload, from_key)) = self.fetch_full_address(address).await? {
                out.push((*address, payload, from_key));
            }
        }
        Ok(out)
    }
}

/// Spec.md §4.6's probabilistic-cover variant: on a local prefix hit, GET
/// the prefix endpoint (which returns every ciphertext sharing that
/// prefix, across all mailboxes) and match each returned frame's address
/// against `candidates`. On a local miss, issue the identical GET with
/// probability `retrieve_probability` purely as cover traffic, discarding
/// the response either way.
pub struct ProbabilisticCoverMessageRetriever {
    http: reqwest::Client,
    server_url: String,
    retrieve_probability: f64,
}

impl ProbabilisticCoverMessageRetriever {
    pub fn new(http: reqwest::Client, server_url: String, retrieve_probability: f64) -> Self {
        Self {
            http,
            server_url,
            retrieve_probability,
        }
    }

    async fn fetch_prefix(&self, adr_short_hex: &str) -> Result<Vec<WirePigeonholeMessage>, ClientError> {
        let resp = self
            .http
            .get(format!("{}/ph/{}", self.server_url, adr_short_hex))
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::TransportTransient(format!("ph prefix GET returned {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        let frames: Vec<Vec<u8>> = api::from_msgpack(&bytes)?;
        frames
            .iter()
            .map(|frame| {
                dsnet_proto::wire::decode_any(frame)?
                    .into_pigeonhole_message()
                    .ok_or_else(|| ClientError::TransportTransient("prefix GET returned wrong frame tag".into()))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl MessageRetriever for ProbabilisticCoverMessageRetriever {
    async fn retrieve(&self, adr_short_hex: &str, candidates: &[[u8; 32]]) -> Result<Vec<RetrievedMessage>, ClientError> {
        let is_local_hit = candidates.iter().any(|a| dsnet_crypto::hash::adr_short(a) == adr_short_hex);

        if !is_local_hit {
            if rand::thread_rng().gen_bool(self.retrieve_probability.clamp(0.0, 1.0)) {
                let _ = self.fetch_prefix(adr_short_hex).await;
            }
            return Ok(Vec::new());
        }

        let frames = self.fetch_prefix(adr_short_hex).await?;
        let mut out = Vec::new();
        for frame in frames {
            if candidates.contains(&frame.address) {
                out.push((frame.address, frame.payload, frame.from_key));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_probability_clamps_out_of_range_values() {
        assert!((0.0_f64..=1.0).contains(&1.5_f64.clamp(0.0, 1.0)));
        assert!((0.0_f64..=1.0).contains(&(-0.5_f64).clamp(0.0, 1.0)));
    }
}
