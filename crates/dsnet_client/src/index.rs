//! Search index abstraction (spec.md §4.8). `Index` is polymorphic over
//! in-memory, external full-text, or MSPSI-backed implementations; this
//! crate carries an in-memory reference implementation for tests and
//! small deployments.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

use dsnet_crypto::oprf;

use crate::config::QueryType;
use crate::conversation::Conversation;
use crate::error::ClientError;
use crate::mspsi::{self, Mention};

/// A document held by this node's index, and returned verbatim by
/// `getDocuments()` (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct Document {
    pub id: u32,
    pub title: String,
    pub body: String,
}

#[async_trait::async_trait]
pub trait Index: Send + Sync {
    /// Run an already-decoded query against the index, returning an
    /// encoded result payload if anything matched. `query_type` picks the
    /// decoding: CLEARTEXT keywords, or DPSI blinded OPRF points.
    async fn search(&self, encoded_query: &[u8], query_type: QueryType) -> Result<Option<Vec<u8>>, ClientError>;

    /// Turn a raw search result into the payload this node sends back
    /// over the conversation that asked for it.
    fn process_search_results(&self, encoded_results: &[u8], conversation: &Conversation) -> Result<Vec<u8>, ClientError>;

    /// Everything this index would publish: total document count plus the
    /// named-entity mentions MSPSI-style publication encodes.
    fn publish(&self) -> (usize, Vec<Mention>);

    fn get_documents(&self) -> Vec<Document>;
}

/// In-memory reference index, holding both a plaintext keyword index
/// (CLEARTEXT) and the OPRF secret answering DPSI queries over the same
/// documents (spec.md §3's `queryType`).
pub struct MemoryIndex {
    documents: Vec<Document>,
    /// The `s_pub` this index's own mentions were (or would be) published
    /// under; DPSI queries are answered by re-blinding with this same
    /// scalar so a querier's `decode_reply` recovers the matching points.
    s_pub: Scalar,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            s_pub: oprf::sample_scalar(),
        }
    }
}

impl MemoryIndex {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            s_pub: oprf::sample_scalar(),
        }
    }

    fn matches(&self, keywords: &[String]) -> Vec<u32> {
        self.documents
            .iter()
            .filter(|doc| {
                let haystack = format!("{} {}", doc.title, doc.body).to_lowercase();
                keywords.iter().any(|kwd| haystack.contains(&kwd.to_lowercase()))
            })
            .map(|doc| doc.id)
            .collect()
    }

    fn search_cleartext(&self, encoded_query: &[u8]) -> Result<Option<Vec<u8>>, ClientError> {
        let payload: dsnet_proto::wire::CleartextQueryPayload = dsnet_proto::api::from_msgpack(encoded_query)?;
        let doc_ids = self.matches(&payload.keywords);
        if doc_ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(dsnet_proto::api::to_msgpack(&doc_ids)?))
    }

    /// DPSI side: re-blind each of the querier's blinded points with this
    /// index's own `s_pub` (spec.md §4.7's `reply`). The responder never
    /// learns which keywords matched — only the querier can unblind and
    /// probe the published filter.
    fn search_dpsi(&self, encoded_query: &[u8]) -> Result<Option<Vec<u8>>, ClientError> {
        let blinded: Vec<[u8; 32]> = dsnet_proto::api::from_msgpack(encoded_query)?;
        if blinded.is_empty() {
            return Ok(None);
        }
        let points: Vec<RistrettoPoint> = blinded
            .iter()
            .map(oprf::decompress)
            .collect::<Result<_, _>>()?;
        let replies = mspsi::reply(&self.s_pub, &points);
        let compressed: Vec<[u8; 32]> = replies.iter().map(oprf::compress).collect();
        Ok(Some(dsnet_proto::api::to_msgpack(&compressed)?))
    }
}

#[async_trait::async_trait]
impl Index for MemoryIndex {
    async fn search(&self, encoded_query: &[u8], query_type: QueryType) -> Result<Option<Vec<u8>>, ClientError> {
        match query_type {
            QueryType::Cleartext => self.search_cleartext(encoded_query),
            QueryType::Dpsi => self.search_dpsi(encoded_query),
        }
    }

    fn process_search_results(&self, encoded_results: &[u8], _conversation: &Conversation) -> Result<Vec<u8>, ClientError> {
        Ok(encoded_results.to_vec())
    }

    fn publish(&self) -> (usize, Vec<Mention>) {
        let mentions = self
            .documents
            .iter()
            .flat_map(|doc| {
                doc.title
                    .split_whitespace()
                    .map(move |word| Mention {
                        doc_index: doc.id,
                        text: word.to_lowercase(),
                    })
            })
            .collect();
        (self.documents.len(), mentions)
    }

    fn get_documents(&self) -> Vec<Document> {
        self.documents.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_documents() -> Vec<Document> {
        vec![
            Document { id: 0, title: "Rust networking".into(), body: "async sockets".into() },
            Document { id: 1, title: "Cooking".into(), body: "pasta recipes".into() },
        ]
    }

    #[tokio::test]
    async fn search_matches_case_insensitively() {
        let index = MemoryIndex::new(sample_documents());
        let query = dsnet_proto::api::to_msgpack(&dsnet_proto::wire::CleartextQueryPayload {
            keywords: vec!["RUST".into()],
        })
        .unwrap();
        let result = index.search(&query, QueryType::Cleartext).await.unwrap().unwrap();
        let doc_ids: Vec<u32> = dsnet_proto::api::from_msgpack(&result).unwrap();
        assert_eq!(doc_ids, vec![0]);
    }

    #[tokio::test]
    async fn no_match_returns_none() {
        let index = MemoryIndex::new(sample_documents());
        let query = dsnet_proto::api::to_msgpack(&dsnet_proto::wire::CleartextQueryPayload {
            keywords: vec!["quantum".into()],
        })
        .unwrap();
        assert!(index.search(&query, QueryType::Cleartext).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dpsi_search_lets_querier_recover_a_real_match() {
        // Mirrors spec.md §8 scenario S5, but driven entirely through the
        // `Index` trait rather than calling `mspsi` functions directly.
        // Builds the index around a publication filter from `mspsi::publish`
        // directly, so the index's `s_pub` matches the filter used below.
        let mentions = vec![Mention { doc_index: 0, text: "foo".into() }];
        let (s_pub, filter) = mspsi::publish(&mentions, 16);
        let index = MemoryIndex { documents: vec![Document { id: 0, title: "foo".into(), body: "".into() }], s_pub };

        let (s_q, blinded) = mspsi::query(&["foo".to_string()]);
        let encoded_query = dsnet_proto::api::to_msgpack(
            &blinded.iter().map(oprf::compress).collect::<Vec<[u8; 32]>>(),
        )
        .unwrap();

        let encoded_reply = index.search(&encoded_query, QueryType::Dpsi).await.unwrap().unwrap();
        let compressed_reply: Vec<[u8; 32]> = dsnet_proto::api::from_msgpack(&encoded_reply).unwrap();
        let replies: Vec<RistrettoPoint> = compressed_reply.iter().map(oprf::decompress).collect::<Result<_, _>>().unwrap();
        let probes = mspsi::decode_reply(&s_q, &replies);

        let matches = mspsi::process_reply(&probes, 1, &filter);
        assert_eq!(matches[0], vec![0]);
    }

    #[test]
    fn publish_reports_total_document_count() {
        let index = MemoryIndex::new(sample_documents());
        let (total, _) = index.publish();
        assert_eq!(total, 2);
    }
}
