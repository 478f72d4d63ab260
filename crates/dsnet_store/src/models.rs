//! Database row models — these map to/from SQL rows (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Querier,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum QueryType {
    Cleartext,
    Dpsi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PeerRow {
    pub id: i64,
    pub public_key: Vec<u8>,
    pub nym: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// A persisted `Conversation` (spec.md §3). `query`/`query_mspsi_secret`
/// are only `Some` when `role == Querier`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub role: Role,
    pub local_secret: Vec<u8>,
    pub local_public: Vec<u8>,
    pub other_public: Vec<u8>,
    pub query: Option<Vec<u8>>,
    pub query_type: QueryType,
    pub query_mspsi_secret: Option<Vec<u8>>,
}

/// A currently-listening pigeonhole (spec.md's `PigeonHole`, minus the
/// derived `address`/`symKey`, which are recomputed from `key_for_hash`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PigeonholeRow {
    pub address: Vec<u8>,
    pub conversation_id: String,
    pub direction: Direction,
    pub counter: i64,
    pub key_for_hash: Vec<u8>,
}

/// A persisted `PigeonHoleMessage`, keyed by its address (the natural key
/// insert-ignore relies on).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub address: Vec<u8>,
    pub conversation_id: String,
    pub payload: Vec<u8>,
    pub from_key: Vec<u8>,
    pub direction: Direction,
    pub message_number: i64,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParameterRow {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TokenRow {
    pub id: i64,
    pub token_secret_key: Vec<u8>,
    pub blind_signature: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServerKeyRow {
    pub id: i64,
    pub public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicationRow {
    pub id: i64,
    pub secret_key: Vec<u8>,
    pub mspsi_secret: Option<Vec<u8>>,
    pub nym: String,
    pub nb_docs: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicationMessageRow {
    pub publisher_public_key: Vec<u8>,
    pub nym: String,
    pub cuckoo_filter: Vec<u8>,
    pub nb_docs: i64,
    pub created_at: DateTime<Utc>,
}
