//! Transactional, idempotent storage contract (spec.md §4.4, C4).

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::models::{
    ConversationRow, Direction, MessageRow, PeerRow, PigeonholeRow, PublicationMessageRow, PublicationRow,
    QueryType, Role, ServerKeyRow, TokenRow,
};

/// A fully reconstructed conversation: the row plus its listening
/// pigeonholes and ordered messages, as loaded from storage.
#[derive(Debug, Clone)]
pub struct LoadedConversation {
    pub conversation: ConversationRow,
    pub pigeonholes: Vec<PigeonholeRow>,
    pub messages: Vec<MessageRow>,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationUpsert {
    pub conversation: ConversationRow,
    /// The full in-memory set of listening pigeonhole addresses after this
    /// save. The repository diffs this against what's persisted and
    /// deletes/inserts accordingly (spec.md §4.4).
    pub listening_pigeonholes: Vec<PigeonholeRow>,
}

impl Default for ConversationRow {
    fn default() -> Self {
        Self {
            id: String::new(),
            created_at: Utc::now(),
            role: Role::Querier,
            local_secret: Vec::new(),
            local_public: Vec::new(),
            other_public: Vec::new(),
            query: None,
            query_type: QueryType::Cleartext,
            query_mspsi_secret: None,
        }
    }
}

/// Implements the storage contract of spec.md §4.4 against SQLite via sqlx.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a conversation by id. On update, computes the symmetric
    /// difference between persisted and in-memory listening pigeonhole
    /// addresses and deletes the pruned ones in the same transaction as the
    /// new inserts (spec.md §4.4).
    pub async fn save_conversation(&self, upsert: &ConversationUpsert) -> Result<(), StoreError> {
        let c = &upsert.conversation;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversation
                (id, created_at, role, local_secret, local_public, other_public, query, query_type, query_mspsi_secret)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                query = excluded.query,
                query_mspsi_secret = excluded.query_mspsi_secret",
        )
        .bind(&c.id)
        .bind(c.created_at)
        .bind(c.role)
        .bind(&c.local_secret)
        .bind(&c.local_public)
        .bind(&c.other_public)
        .bind(&c.query)
        .bind(c.query_type)
        .bind(&c.query_mspsi_secret)
        .execute(&mut *tx)
        .await?;

        let persisted: Vec<(Vec<u8>,)> =
            sqlx::query_as("SELECT address FROM pigeonhole WHERE conversation_id = ?")
                .bind(&c.id)
                .fetch_all(&mut *tx)
                .await?;
        let persisted_addrs: HashSet<Vec<u8>> = persisted.into_iter().map(|(a,)| a).collect();
        let in_memory_addrs: HashSet<Vec<u8>> = upsert
            .listening_pigeonholes
            .iter()
            .map(|p| p.address.clone())
            .collect();

        for stale in persisted_addrs.difference(&in_memory_addrs) {
            sqlx::query("DELETE FROM pigeonhole WHERE address = ?")
                .bind(stale)
                .execute(&mut *tx)
                .await?;
        }

        for fresh in upsert
            .listening_pigeonholes
            .iter()
            .filter(|p| !persisted_addrs.contains(&p.address))
        {
            sqlx::query(
                "INSERT INTO pigeonhole (address, conversation_id, direction, counter, key_for_hash)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(address) DO NOTHING",
            )
            .bind(&fresh.address)
            .bind(&fresh.conversation_id)
            .bind(fresh.direction)
            .bind(fresh.counter)
            .bind(&fresh.key_for_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert a received/sent message on its natural key (address),
    /// ignoring duplicates (spec.md §4.4, §4.2's idempotent-persistence note).
    pub async fn save_message(&self, msg: &MessageRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO message (address, conversation_id, payload, from_key, direction, message_number, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(address) DO NOTHING",
        )
        .bind(&msg.address)
        .bind(&msg.conversation_id)
        .bind(&msg.payload)
        .bind(&msg.from_key)
        .bind(msg.direction)
        .bind(msg.message_number)
        .bind(msg.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_full(&self, conversation: ConversationRow) -> Result<LoadedConversation, StoreError> {
        let pigeonholes: Vec<PigeonholeRow> =
            sqlx::query_as("SELECT * FROM pigeonhole WHERE conversation_id = ?")
                .bind(&conversation.id)
                .fetch_all(&self.pool)
                .await?;
        let messages: Vec<MessageRow> =
            sqlx::query_as("SELECT * FROM message WHERE conversation_id = ? ORDER BY received_at ASC")
                .bind(&conversation.id)
                .fetch_all(&self.pool)
                .await?;
        Ok(LoadedConversation {
            conversation,
            pigeonholes,
            messages,
        })
    }

    /// At most one result; messages ordered by timestamp ascending.
    pub async fn get_conversation_by_address(
        &self,
        address: &[u8],
    ) -> Result<Option<LoadedConversation>, StoreError> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT c.* FROM conversation c
             JOIN pigeonhole p ON p.conversation_id = c.id
             WHERE p.address = ?
             LIMIT 1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(c) => Ok(Some(self.load_full(c).await?)),
            None => Ok(None),
        }
    }

    /// Every persisted conversation, fully loaded — used to rehydrate the
    /// coordinator's in-memory conversation/address index on startup
    /// (spec.md §4.9's resume path).
    pub async fn list_conversations(&self) -> Result<Vec<LoadedConversation>, StoreError> {
        let rows: Vec<ConversationRow> = sqlx::query_as("SELECT * FROM conversation")
            .fetch_all(&self.pool)
            .await?;
        let mut loaded = Vec::with_capacity(rows.len());
        for row in rows {
            loaded.push(self.load_full(row).await?);
        }
        Ok(loaded)
    }

    pub async fn get_conversation_by_key(&self, other_public: &[u8]) -> Result<Option<LoadedConversation>, StoreError> {
        let row: Option<ConversationRow> =
            sqlx::query_as("SELECT * FROM conversation WHERE other_public = ? LIMIT 1")
                .bind(other_public)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(c) => Ok(Some(self.load_full(c).await?)),
            None => Ok(None),
        }
    }

    /// Exact match on the 3-byte hex prefix, across all conversations.
    pub async fn get_pigeonholes_by_short_address(&self, adr_short_hex: &str) -> Result<Vec<PigeonholeRow>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT * FROM pigeonhole WHERE substr(hex(address), 1, 6) = ? COLLATE NOCASE",
        )
        .bind(adr_short_hex)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Select newest-by-timestamp, delete it in the same transaction, return it.
    pub async fn pop_token(&self) -> Result<Option<TokenRow>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let token: Option<TokenRow> =
            sqlx::query_as("SELECT * FROM token ORDER BY created_at DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(ref t) = token {
            sqlx::query("DELETE FROM token WHERE id = ?")
                .bind(t.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(token)
    }

    pub async fn save_tokens(&self, tokens: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (token_secret_key, blind_signature) in tokens {
            sqlx::query(
                "INSERT INTO token (token_secret_key, blind_signature, created_at) VALUES (?, ?, ?)",
            )
            .bind(token_secret_key)
            .bind(blind_signature)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Append with timestamp; the latest wins (read via `latest_server_key`).
    pub async fn save_token_server_key(&self, public_key: &[u8]) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO server_key (public_key, created_at) VALUES (?, ?)")
            .bind(public_key)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn latest_server_key(&self) -> Result<Option<ServerKeyRow>, StoreError> {
        let row = sqlx::query_as("SELECT * FROM server_key ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// `ON CONFLICT(publisherPublicKey) DO NOTHING`.
    pub async fn save_publication_message(&self, pm: &PublicationMessageRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO publication_message (publisher_public_key, nym, cuckoo_filter, nb_docs, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(publisher_public_key) DO NOTHING",
        )
        .bind(&pm.publisher_public_key)
        .bind(&pm.nym)
        .bind(&pm.cuckoo_filter)
        .bind(pm.nb_docs)
        .bind(pm.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_publication(&self, p: &PublicationRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO publication (secret_key, mspsi_secret, nym, nb_docs, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&p.secret_key)
        .bind(&p.mspsi_secret)
        .bind(&p.nym)
        .bind(p.nb_docs)
        .bind(p.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// MAX(timestamp) over persisted broadcasts; used by the coordinator
    /// (§4.9) to resume the notification stream from where it left off.
    /// We track this as the max of message/publication-message timestamps.
    pub async fn get_last_broadcast_timestamp(&self) -> Result<Option<chrono::DateTime<Utc>>, StoreError> {
        let row: (Option<chrono::DateTime<Utc>>,) = sqlx::query_as(
            "SELECT MAX(ts) FROM (
                SELECT received_at AS ts FROM message
                UNION ALL
                SELECT created_at AS ts FROM publication_message
             )",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn set_parameter(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO parameter (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_parameter(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM parameter WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn upsert_peer(&self, public_key: &[u8], nym: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO peer (public_key, nym, added_at) VALUES (?, ?, ?)
             ON CONFLICT(public_key) DO UPDATE SET nym = COALESCE(excluded.nym, peer.nym)",
        )
        .bind(public_key)
        .bind(nym)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All known peers, in the order they were added — the fan-out list
    /// for query issuance (spec.md §4.3 step 4).
    pub async fn list_peers(&self) -> Result<Vec<PeerRow>, StoreError> {
        let rows = sqlx::query_as("SELECT id, public_key, nym, added_at FROM peer ORDER BY added_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub fn direction_marker() -> Direction {
        Direction::Incoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn parameter_roundtrip() {
        let repo = SqliteRepository::new(test_pool().await);
        repo.set_parameter("nym", "node-1").await.unwrap();
        assert_eq!(repo.get_parameter("nym").await.unwrap(), Some("node-1".into()));
        assert_eq!(repo.get_parameter("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn pop_token_deletes_and_returns_newest() {
        let repo = SqliteRepository::new(test_pool().await);
        repo.save_tokens(&[(vec![1], vec![2]), (vec![3], vec![4])])
            .await
            .unwrap();
        let t = repo.pop_token().await.unwrap().expect("a token");
        assert_eq!(t.token_secret_key, vec![3]);
        let t2 = repo.pop_token().await.unwrap().expect("a token");
        assert_eq!(t2.token_secret_key, vec![1]);
        assert!(repo.pop_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publication_message_insert_ignores_duplicate_publisher() {
        let repo = SqliteRepository::new(test_pool().await);
        let pm = PublicationMessageRow {
            publisher_public_key: vec![9; 32],
            nym: "a".into(),
            cuckoo_filter: vec![1, 2, 3],
            nb_docs: 5,
            created_at: Utc::now(),
        };
        repo.save_publication_message(&pm).await.unwrap();
        let mut pm2 = pm.clone();
        pm2.nb_docs = 99;
        repo.save_publication_message(&pm2).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT nb_docs FROM publication_message WHERE publisher_public_key = ?")
            .bind(&pm.publisher_public_key)
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(row.0, 5);
    }

    #[tokio::test]
    async fn save_conversation_prunes_stale_pigeonholes() {
        let repo = SqliteRepository::new(test_pool().await);
        let conv = ConversationRow {
            id: "c1".into(),
            ..Default::default()
        };
        let ph0 = PigeonholeRow {
            address: vec![0; 32],
            conversation_id: "c1".into(),
            direction: Direction::Outgoing,
            counter: 0,
            key_for_hash: vec![0; 32],
        };
        repo.save_conversation(&ConversationUpsert {
            conversation: conv.clone(),
            listening_pigeonholes: vec![ph0.clone()],
        })
        .await
        .unwrap();

        let ph1 = PigeonholeRow {
            address: vec![1; 32],
            ..ph0.clone()
        };
        repo.save_conversation(&ConversationUpsert {
            conversation: conv,
            listening_pigeonholes: vec![ph1],
        })
        .await
        .unwrap();

        let remaining = repo.get_pigeonholes_by_short_address(&hex::encode(&[1u8; 3])).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].address, vec![1; 32]);
    }
}
