//! Conversation state machine (spec.md §4.2, C3).
//!
//! An in-memory `Conversation` is a transient projection rebuilt from
//! storage on load; the repository owns persisted state (spec.md §9's
//! "cyclic object graph" design note). This module holds the ratchets and
//! translates between them and the `ConversationUpsert`/`LoadedConversation`
//! shapes `dsnet_store` persists.

use std::collections::HashMap;

use chrono::Utc;
use curve25519_dalek::scalar::Scalar;

use dsnet_crypto::ratchet::{Direction as RatchetDirection, PigeonholeRatchet, PigeonholeSlot};
use dsnet_crypto::x25519::KeyPair;
use dsnet_store::models::{
    ConversationRow, Direction as RowDirection, MessageRow, PigeonholeRow, QueryType as RowQueryType, Role,
};
use dsnet_store::repository::{ConversationUpsert, LoadedConversation};

use crate::config::QueryType;
use crate::error::ClientError;

/// How many listening slots to keep open ahead of the current counter.
/// Spec.md §4.2 only requires "the next" listener be open; we keep a small
/// lookahead window so out-of-order delivery of the network's async
/// mailbox fetches doesn't appear as a dropped message.
const LISTEN_WINDOW: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationRole {
    Querier,
    Responder,
}

/// A reconstructed conversation plus its two ratchets. `outgoing` writes
/// this conversation's replies; `incoming` derives the addresses we listen
/// on for the peer's replies.
pub struct Conversation {
    pub id: String,
    pub role: ConversationRole,
    pub local_keypair: KeyPair,
    pub other_public: [u8; 32],
    pub query: Option<Vec<u8>>,
    pub query_type: QueryType,
    pub query_mspsi_secret: Option<Scalar>,
    pub messages: Vec<MessageRow>,
    outgoing: PigeonholeRatchet,
    incoming: PigeonholeRatchet,
    listening: HashMap<[u8; 32], PigeonholeSlot>,
}

impl Conversation {
    /// INIT → QUERY_SENT / INIT → RESPONDING: derive the shared secret and
    /// open both ratchets at counter 0 (spec.md Conversation invariant 1).
    fn new(
        id: String,
        role: ConversationRole,
        local_keypair: KeyPair,
        other_public: [u8; 32],
        query: Option<Vec<u8>>,
        query_type: QueryType,
        query_mspsi_secret: Option<Scalar>,
    ) -> Self {
        let shared_secret = local_keypair.diffie_hellman(&other_public);
        let (out_dir, in_dir) = match role {
            ConversationRole::Querier => (RatchetDirection::QuerierToResponder, RatchetDirection::ResponderToQuerier),
            ConversationRole::Responder => (RatchetDirection::ResponderToQuerier, RatchetDirection::QuerierToResponder),
        };
        let mut conversation = Self {
            id,
            role,
            local_keypair,
            other_public,
            query,
            query_type,
            query_mspsi_secret,
            messages: Vec::new(),
            outgoing: PigeonholeRatchet::new(shared_secret, out_dir),
            incoming: PigeonholeRatchet::new(shared_secret, in_dir),
            listening: HashMap::new(),
        };
        conversation.open_listen_window();
        conversation
    }

    /// Querier side of spec.md §4.3 step 4: one Conversation per peer,
    /// sharing the same ephemeral query keypair and encoded payload.
    pub fn create_from_querier(
        id: String,
        query_keypair_secret: [u8; 32],
        peer_public: [u8; 32],
        query_payload: Vec<u8>,
        query_type: QueryType,
        query_mspsi_secret: Option<Scalar>,
    ) -> Self {
        Self::new(
            id,
            ConversationRole::Querier,
            KeyPair::from_secret_bytes(query_keypair_secret),
            peer_public,
            Some(query_payload),
            query_type,
            query_mspsi_secret,
        )
    }

    /// Responder side of spec.md §4.2: a fresh local ephemeral answering an
    /// inbound query's `publicKey`.
    pub fn create_from_responder(id: String, query_public: [u8; 32], query_type: QueryType) -> Self {
        Self::new(id, ConversationRole::Responder, KeyPair::generate(), query_public, None, query_type, None)
    }

    /// Open listening slots from the incoming ratchet's current counter up
    /// through the lookahead window, without consuming outgoing counters.
    fn open_listen_window(&mut self) {
        let base = self.incoming.counter();
        for n in base..base + LISTEN_WINDOW {
            if let Ok(slot) = self.incoming.slot_at(n) {
                self.listening.insert(slot.address, slot);
            }
        }
    }

    /// Decrypt an inbound message at `address` if we're listening on it.
    /// Advances the incoming counter past the matched slot and refills the
    /// listen window (spec.md §4.2: "advance incoming counter; open
    /// incoming slot n+1 listener"). Returns `Ok(None)` for a duplicate
    /// (slot no longer listened on) so callers treat it as idempotent.
    pub fn try_ingest(&mut self, address: &[u8; 32], ciphertext: &[u8], from_key: [u8; 32]) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(slot) = self.listening.get(address) else {
            return Ok(None);
        };
        let plaintext = PigeonholeRatchet::decrypt(slot, ciphertext).map_err(|_| ClientError::DecryptFailure)?;

        self.listening.remove(address);
        while self.incoming.counter() <= matching_counter(&self.incoming, address) {
            self.incoming.advance().map_err(ClientError::Crypto)?;
        }
        self.open_listen_window();

        self.messages.push(MessageRow {
            address: address.to_vec(),
            conversation_id: self.id.clone(),
            payload: plaintext.clone(),
            from_key: from_key.to_vec(),
            direction: RowDirection::Incoming,
            message_number: self.messages.len() as i64,
            received_at: Utc::now(),
        });
        Ok(Some(plaintext))
    }

    /// Consume the next outgoing slot, writing `plaintext` into it.
    /// Returns the address to POST to and the padded ciphertext.
    pub fn send(&mut self, plaintext: &[u8]) -> Result<([u8; 32], Vec<u8>), ClientError> {
        let (slot, ciphertext) = self.outgoing.encrypt_next(plaintext).map_err(ClientError::Crypto)?;
        self.messages.push(MessageRow {
            address: slot.address.to_vec(),
            conversation_id: self.id.clone(),
            payload: ciphertext.clone(),
            from_key: self.local_keypair.public_bytes().to_vec(),
            direction: RowDirection::Outgoing,
            message_number: self.messages.len() as i64,
            received_at: Utc::now(),
        });
        Ok((slot.address, ciphertext))
    }

    pub fn listening_addresses(&self) -> impl Iterator<Item = &[u8; 32]> {
        self.listening.keys()
    }

    /// Build the repository upsert for this conversation's current state
    /// (spec.md §4.4's `saveConversation`).
    pub fn to_upsert(&self) -> ConversationUpsert {
        let row = ConversationRow {
            id: self.id.clone(),
            created_at: Utc::now(),
            role: match self.role {
                ConversationRole::Querier => Role::Querier,
                ConversationRole::Responder => Role::Responder,
            },
            local_secret: self.local_keypair.secret_bytes().to_vec(),
            local_public: self.local_keypair.public_bytes().to_vec(),
            other_public: self.other_public.to_vec(),
            query: self.query.clone(),
            query_type: match self.query_type {
                QueryType::Cleartext => RowQueryType::Cleartext,
                QueryType::Dpsi => RowQueryType::Dpsi,
            },
            query_mspsi_secret: self.query_mspsi_secret.map(|s| s.to_bytes().to_vec()),
        };
        // Listening slots always come off `incoming`, regardless of role.
        let in_direction = RowDirection::Incoming;
        let listening_pigeonholes = self
            .listening
            .values()
            .map(|slot| PigeonholeRow {
                address: slot.address.to_vec(),
                conversation_id: self.id.clone(),
                direction: in_direction,
                counter: self.incoming.counter() as i64,
                key_for_hash: slot.key_for_hash.to_vec(),
            })
            .collect();
        ConversationUpsert {
            conversation: row,
            listening_pigeonholes,
        }
    }

    /// Reconstruct from a repository load (spec.md §9's arena-owned
    /// projection rebuild).
    pub fn from_loaded(loaded: LoadedConversation) -> Result<Self, ClientError> {
        let c = loaded.conversation;
        let role = match c.role {
            Role::Querier => ConversationRole::Querier,
            Role::Responder => ConversationRole::Responder,
        };
        let other_public: [u8; 32] = c
            .other_public
            .try_into()
            .map_err(|_| ClientError::Store(dsnet_store::StoreError::NotFound("other_public malformed".into())))?;
        let local_secret: [u8; 32] = c
            .local_secret
            .try_into()
            .map_err(|_| ClientError::Store(dsnet_store::StoreError::NotFound("local_secret malformed".into())))?;
        let query_mspsi_secret = c
            .query_mspsi_secret
            .map(|bytes| -> Result<Scalar, ClientError> {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ClientError::Store(dsnet_store::StoreError::NotFound("mspsi secret malformed".into())))?;
                Option::<Scalar>::from(Scalar::from_canonical_bytes(arr))
                    .ok_or_else(|| ClientError::Store(dsnet_store::StoreError::NotFound("mspsi secret not canonical".into())))
            })
            .transpose()?;

        let mut conversation = Self::new(
            c.id,
            role,
            KeyPair::from_secret_bytes(local_secret),
            other_public,
            c.query,
            match c.query_type {
                RowQueryType::Cleartext => QueryType::Cleartext,
                RowQueryType::Dpsi => QueryType::Dpsi,
            },
            query_mspsi_secret,
        );

        // Fast-forward the incoming ratchet past any counters already
        // persisted, then rebuild the listen window from scratch.
        let max_counter = loaded.pigeonholes.iter().map(|p| p.counter).max();
        if let Some(max_counter) = max_counter {
            conversation.incoming = PigeonholeRatchet::with_counter(
                conversation.local_keypair.diffie_hellman(&other_public),
                conversation.incoming_direction(),
                (max_counter as u64) + 1,
            );
        }
        conversation.listening.clear();
        for row in &loaded.pigeonholes {
            if let Ok(addr) = row.address.clone().try_into() {
                let addr: [u8; 32] = addr;
                if let Ok(slot) = dsnet_crypto::ratchet::slot_from_key_for_hash(&to_array(&row.key_for_hash)?) {
                    debug_assert_eq!(slot.address, addr);
                    conversation.listening.insert(addr, slot);
                }
            }
        }
        conversation.open_listen_window();
        conversation.messages = loaded.messages;
        Ok(conversation)
    }

    fn incoming_direction(&self) -> RatchetDirection {
        match self.role {
            ConversationRole::Querier => RatchetDirection::ResponderToQuerier,
            ConversationRole::Responder => RatchetDirection::QuerierToResponder,
        }
    }
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32], ClientError> {
    bytes
        .try_into()
        .map_err(|_| ClientError::Store(dsnet_store::StoreError::NotFound("key_for_hash malformed".into())))
}

/// Find which counter in `[ratchet.counter(), ratchet.counter()+LISTEN_WINDOW)`
/// derives to `address`, used to advance the incoming ratchet exactly past a
/// matched slot even when the window delivered messages out of order.
fn matching_counter(ratchet: &PigeonholeRatchet, address: &[u8; 32]) -> u64 {
    let base = ratchet.counter();
    for n in base..base + LISTEN_WINDOW {
        if let Ok(slot) = ratchet.slot_at(n) {
            if &slot.address == address {
                return n;
            }
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn querier_and_responder_agree_on_first_exchange() {
        let querier_query_key = [1u8; 32];
        let responder_key = KeyPair::generate();

        let mut querier = Conversation::create_from_querier(
            "conv-1".into(),
            querier_query_key,
            responder_key.public_bytes(),
            b"keywords".to_vec(),
            QueryType::Cleartext,
            None,
        );

        let mut responder = Conversation::new(
            "conv-1-peer".into(),
            ConversationRole::Responder,
            responder_key,
            KeyPair::from_secret_bytes(querier_query_key).public_bytes(),
            None,
            QueryType::Cleartext,
            None,
        );

        let (address, ciphertext) = responder.send(b"here are your results").unwrap();
        let plaintext = querier.try_ingest(&address, &ciphertext, responder.local_keypair.public_bytes()).unwrap();
        assert_eq!(plaintext.unwrap(), b"here are your results");
    }

    #[test]
    fn duplicate_delivery_is_swallowed() {
        let querier_query_key = [2u8; 32];
        let responder_key = KeyPair::generate();
        let mut querier = Conversation::create_from_querier(
            "conv-2".into(),
            querier_query_key,
            responder_key.public_bytes(),
            b"kw".to_vec(),
            QueryType::Cleartext,
            None,
        );
        let mut responder = Conversation::new(
            "conv-2-peer".into(),
            ConversationRole::Responder,
            responder_key,
            KeyPair::from_secret_bytes(querier_query_key).public_bytes(),
            None,
            QueryType::Cleartext,
            None,
        );

        let (address, ciphertext) = responder.send(b"reply").unwrap();
        let first = querier.try_ingest(&address, &ciphertext, [0u8; 32]).unwrap();
        assert!(first.is_some());
        let second = querier.try_ingest(&address, &ciphertext, [0u8; 32]).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn self_peer_conversation_still_progresses() {
        // spec.md §4.2's tie-break: a peer equal to my own key must not be
        // short-circuited.
        let key = KeyPair::generate();
        let secret = key.secret_bytes();
        let mut conversation = Conversation::create_from_querier(
            "conv-self".into(),
            secret,
            key.public_bytes(),
            b"kw".to_vec(),
            QueryType::Cleartext,
            None,
        );
        assert!(conversation.send(b"echo").is_ok());
    }
}
