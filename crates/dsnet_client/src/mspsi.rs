//! Multi-party keyword-matching private set intersection (spec.md §4.7, C8).
//!
//! The data owner publishes a cuckoo filter of OPRF-blinded, per-document
//! salted mentions; the querier blinds its keywords, has the owner
//! re-blind them, unblinds, and probes the filter per document to learn a
//! match vector without either side learning the other's terms.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

use dsnet_crypto::cuckoo::PublicationFilter;
use dsnet_crypto::{hash, oprf};

/// `publish`'s error rate is fixed by the underlying cuckoo filter's
/// bucket geometry (spec.md §4.7 calls for "a fixed constant").
pub const TARGET_FALSE_POSITIVE_RATE: f64 = 0.001;

/// One entity mention extracted from a document, scoped to the document
/// it appears in.
pub struct Mention {
    pub doc_index: u32,
    pub text: String,
}

/// Salt an OPRF point with the document index it belongs to, so the same
/// mention in two different documents lands at different filter slots
/// (spec.md §4.7's "under that document's salt").
fn salted(point: &RistrettoPoint, doc_index: u32) -> [u8; 32] {
    let mut input = Vec::with_capacity(32 + 4);
    input.extend_from_slice(&oprf::compress(point));
    input.extend_from_slice(&doc_index.to_be_bytes());
    hash::hash(&input)
}

/// Data-owner side: build the published cuckoo filter for `mentions`,
/// sized for `n_hits` insertions. Returns the per-publication OPRF secret
/// `s_pub` (kept to answer later `reply` calls) and the filter to publish.
pub fn publish(mentions: &[Mention], n_hits: usize) -> (Scalar, PublicationFilter) {
    let s_pub = oprf::sample_scalar();
    let mut filter = PublicationFilter::with_capacity(n_hits);
    for mention in mentions {
        let point = oprf::evaluate(&s_pub, mention.text.as_bytes());
        // Insertion only fails once the filter's load factor is exhausted;
        // `n_hits` sizing keeps this from happening under normal publish
        // volumes, and a dropped mention only costs one false negative.
        let _ = filter.insert(&salted(&point, mention.doc_index));
    }
    (s_pub, filter)
}

/// Data-owner side: answer each blinded query point with `s_pub · Q_j`.
/// No state beyond `s_pub` is touched.
pub fn reply(s_pub: &Scalar, blinded_queries: &[RistrettoPoint]) -> Vec<RistrettoPoint> {
    blinded_queries.iter().map(|q| oprf::scalar_mult(s_pub, q)).collect()
}

/// Querier side: blind `keywords` with a fresh scalar. Returns the scalar
/// (kept to decode the reply) and the blinded points to send.
pub fn query(keywords: &[String]) -> (Scalar, Vec<RistrettoPoint>) {
    let s_q = oprf::sample_scalar();
    let blinded = keywords.iter().map(|kwd| oprf::evaluate(&s_q, kwd.as_bytes())).collect();
    (s_q, blinded)
}

/// Querier side: remove the querier's blinding from each replied point,
/// recovering `s_pub · H(kwd_j)` — the probes into the publisher's filter.
pub fn decode_reply(s_q: &Scalar, replies: &[RistrettoPoint]) -> Vec<RistrettoPoint> {
    replies.iter().map(|r| oprf::unblind(s_q, r)).collect()
}

/// For each document index in `[0, nb_docs)`, the list of query-keyword
/// indices whose probe hits the filter under that document's salt.
/// Result length is always `nb_docs` (spec.md §4.7's result shape).
pub fn process_reply(probes: &[RistrettoPoint], nb_docs: u32, filter: &PublicationFilter) -> Vec<Vec<usize>> {
    (0..nb_docs)
        .map(|doc_index| {
            probes
                .iter()
                .enumerate()
                .filter(|(_, probe)| filter.contains(&salted(probe, doc_index)))
                .map(|(idx, _)| idx)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mspsi_cycle_finds_matching_document() {
        let mentions = vec![
            Mention { doc_index: 0, text: "alice".into() },
            Mention { doc_index: 1, text: "bob".into() },
        ];
        let (s_pub, filter) = publish(&mentions, 16);

        let keywords = vec!["alice".to_string(), "carol".to_string()];
        let (s_q, blinded) = query(&keywords);
        let replies = reply(&s_pub, &blinded);
        let probes = decode_reply(&s_q, &replies);

        let matches = process_reply(&probes, 2, &filter);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0], vec![0]);
        assert!(matches[1].is_empty());
    }

    #[test]
    fn same_mention_in_different_documents_does_not_cross_match() {
        let mentions = vec![Mention { doc_index: 0, text: "alice".into() }];
        let (s_pub, filter) = publish(&mentions, 16);

        let (s_q, blinded) = query(&["alice".to_string()]);
        let replies = reply(&s_pub, &blinded);
        let probes = decode_reply(&s_q, &replies);

        let matches = process_reply(&probes, 3, &filter);
        assert_eq!(matches[0], vec![0]);
        assert!(matches[1].is_empty());
        assert!(matches[2].is_empty());
    }
}
