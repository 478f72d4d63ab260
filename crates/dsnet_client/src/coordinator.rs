//! Client coordinator (spec.md §4.9, C9): the long-lived notification
//! stream, dispatching NOTIFICATION/QUERY/PUBLICATION frames and driving
//! reconnection with backoff from the last persisted broadcast timestamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use dsnet_crypto::ed25519;
use dsnet_proto::wire::{self, Publication, Query, WireMessage};
use dsnet_store::models::PublicationMessageRow;
use dsnet_store::SqliteRepository;

use crate::config::ClientConfig;
use crate::conversation::Conversation;
use crate::error::ClientError;
use crate::index::Index;
use crate::retriever::MessageRetriever;
use crate::sender::MessageSender;
use crate::token::TokenManager;

/// Consecutive transport-error budget before the coordinator gives up
/// (spec.md §4.9's `MAX_ERRORS`).
pub const MAX_ERRORS: u32 = 5;

pub struct ClientCoordinator {
    config: ClientConfig,
    repository: SqliteRepository,
    token_manager: TokenManager,
    sender: Arc<dyn MessageSender>,
    retriever: Arc<dyn MessageRetriever>,
    index: Arc<dyn Index>,
    http: reqwest::Client,
    conversations: Mutex<HashMap<String, Conversation>>,
    address_index: Mutex<HashMap<[u8; 32], String>>,
    stop: AtomicBool,
    consecutive_errors: AtomicU32,
}

impl ClientCoordinator {
    pub fn new(
        config: ClientConfig,
        repository: SqliteRepository,
        token_manager: TokenManager,
        sender: Arc<dyn MessageSender>,
        retriever: Arc<dyn MessageRetriever>,
        index: Arc<dyn Index>,
    ) -> Self {
        Self {
            config,
            repository,
            token_manager,
            sender,
            retriever,
            index,
            http: reqwest::Client::new(),
            conversations: Mutex::new(HashMap::new()),
            address_index: Mutex::new(HashMap::new()),
            stop: AtomicBool::new(false),
            consecutive_errors: AtomicU32::new(0),
        }
    }

    /// Closes the stream and stops reconnecting. Observed at every
    /// suspension point in `run` (spec.md §4.9's cancellation contract).
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Rebuild the in-memory conversation/address index from everything
    /// already persisted, so a restart resumes listening on every open
    /// pigeonhole rather than only ones opened after the restart
    /// (spec.md §4.9's resume path, paired with `?ts=<unix>` replay).
    pub async fn hydrate(&self) -> Result<(), ClientError> {
        let loaded = self.repository.list_conversations().await?;
        for entry in loaded {
            let conversation = Conversation::from_loaded(entry)?;
            self.reindex_addresses(&conversation.id, &conversation).await;
            self.conversations.lock().await.insert(conversation.id.clone(), conversation);
        }
        Ok(())
    }

    /// `GET /` on the bulletin board and log what it advertises, warning if
    /// its `query_type` doesn't match what this node is configured for
    /// (spec.md §6's `ServerInfo`, fetched once at startup).
    pub async fn probe_server(&self) -> Result<(), ClientError> {
        let info: dsnet_proto::api::ServerInfo = self
            .http
            .get(&self.config.server_url)
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;

        tracing::info!(
            target: "dsnet_client",
            event = "server_probed",
            message = %info.message,
            core_version = %info.core_version,
            server_version = %info.server_version,
            query_type = %info.query_type,
        );

        let configured = match self.config.query_type {
            crate::config::QueryType::Cleartext => "CLEARTEXT",
            crate::config::QueryType::Dpsi => "DPSI",
        };
        if info.query_type != configured {
            tracing::warn!(
                target: "dsnet_client",
                event = "query_type_mismatch",
                configured = %configured,
                server = %info.query_type,
            );
        }
        Ok(())
    }

    /// The long-lived task: reconnect loop with backoff, reading
    /// `lastBroadcastTimestamp` fresh on every (re)connect.
    pub async fn run(&self) -> Result<(), ClientError> {
        self.hydrate().await?;
        self.probe_server().await?;
        let mut backoff = self.config.reconnect_delay;
        while !self.is_stopped() {
            match self.run_once().await {
                Ok(()) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    backoff = self.config.reconnect_delay;
                }
                Err(err) => {
                    let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::warn!(target: "dsnet_client", event = "coordinator_error", error = %err, consecutive = errors);
                    if errors >= self.config.max_consecutive_errors {
                        return Err(ClientError::Fatal(errors));
                    }
                    if self.is_stopped() {
                        break;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(std::time::Duration::from_secs(60));
                }
            }
        }
        Ok(())
    }

    async fn notifications_url(&self) -> Result<String, ClientError> {
        let base = self
            .config
            .server_url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);
        match self.repository.get_last_broadcast_timestamp().await? {
            Some(ts) => Ok(format!("{}/notifications?ts={}", base, ts.timestamp())),
            None => Ok(format!("{}/notifications", base)),
        }
    }

    async fn run_once(&self) -> Result<(), ClientError> {
        let url = self.notifications_url().await?;
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await?;

        loop {
            if self.is_stopped() {
                let _ = ws.close().await;
                return Ok(());
            }
            let Some(frame) = ws.next().await else {
                return Ok(());
            };
            let frame = frame?;
            let bytes = match frame {
                WsMessage::Binary(b) => b,
                WsMessage::Text(t) => t.into_bytes(),
                WsMessage::Close(_) => return Ok(()),
                _ => continue,
            };

            match wire::decode_any(&bytes) {
                Ok(decoded) => {
                    if let Err(err) = self.dispatch(decoded).await {
                        tracing::warn!(target: "dsnet_client", event = "frame_dispatch_failed", error = %err);
                    }
                }
                Err(err) => {
                    tracing::debug!(target: "dsnet_client", event = "frame_decode_failed", error = %err);
                }
            }
        }
    }

    async fn dispatch(&self, message: WireMessage) -> Result<(), ClientError> {
        match message {
            WireMessage::Notification(n) => self.handle_notification(&n.adr_short_hex).await,
            WireMessage::Query(q) => self.handle_query(q).await,
            WireMessage::Publication(p) => self.handle_publication(p).await,
            WireMessage::PigeonholeMessage(_) => Ok(()),
        }
    }

    /// NOTIFICATION → retriever → ingest (spec.md §4.9's dispatch table).
    async fn handle_notification(&self, adr_short_hex: &str) -> Result<(), ClientError> {
        let candidate_rows = self.repository.get_pigeonholes_by_short_address(adr_short_hex).await?;
        let mut candidates = Vec::with_capacity(candidate_rows.len());
        for row in &candidate_rows {
            if let Ok(addr) = <[u8; 32]>::try_from(row.address.as_slice()) {
                candidates.push(addr);
            }
        }
        if candidates.is_empty() {
            return Ok(());
        }

        let fetched = self.retriever.retrieve(adr_short_hex, &candidates).await?;
        for (address, ciphertext, from_key) in fetched {
            let conversation_id = {
                let index = self.address_index.lock().await;
                index.get(&address).cloned()
            };
            let Some(conversation_id) = conversation_id else { continue };

            let mut conversations = self.conversations.lock().await;
            let Some(conversation) = conversations.get_mut(&conversation_id) else { continue };
            match conversation.try_ingest(&address, &ciphertext, from_key) {
                Ok(Some(_plaintext)) => {
                    self.repository.save_message(&last_message(conversation)).await?;
                    self.repository.save_conversation(&conversation.to_upsert()).await?;
                    self.reindex_addresses(&conversation_id, conversation).await;
                }
                Ok(None) => {} // duplicate delivery, swallowed per spec.md §4.2
                Err(ClientError::DecryptFailure) => {
                    tracing::debug!(target: "dsnet_client", event = "pigeonhole_decrypt_failed", address = %hex::encode(address));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// QUERY → validate → search → respond.
    async fn handle_query(&self, q: Query) -> Result<(), ClientError> {
        if !self.validate_query(&q).await? {
            tracing::debug!(target: "dsnet_client", event = "query_rejected");
            return Ok(());
        }

        let Some(encoded_results) = self.index.search(&q.payload, self.config.query_type).await? else {
            return Ok(());
        };

        let conversation_id = hex::encode(q.public_key);
        let mut conversation = Conversation::create_from_responder(conversation_id.clone(), q.public_key, self.config.query_type);
        let payload = self.index.process_search_results(&encoded_results, &conversation)?;
        let (address, ciphertext) = conversation.send(&payload)?;

        self.sender.send(address, ciphertext).await?;
        self.repository.save_conversation(&conversation.to_upsert()).await?;
        self.reindex_addresses(&conversation_id, &conversation).await;
        self.conversations.lock().await.insert(conversation_id, conversation);
        Ok(())
    }

    async fn validate_query(&self, q: &Query) -> Result<bool, ClientError> {
        let Some(server_key) = self.repository.latest_server_key().await? else {
            return Ok(false);
        };
        let signer_public_bytes: [u8; 32] = match server_key.public_key.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let signer_public = dsnet_crypto::oprf::decompress(&signer_public_bytes)?;
        let blind_signature = dsnet_crypto::blindsign::BlindSignature::from_bytes(&q.blind_signature)?;

        if !TokenManager::verify_token(&signer_public, &q.token_public_key, &blind_signature) {
            return Ok(false);
        }

        let mut signed = Vec::with_capacity(32 + q.payload.len());
        signed.extend_from_slice(&q.public_key);
        signed.extend_from_slice(&q.payload);
        Ok(ed25519::verify(&q.token_public_key, &signed, &q.ed25519_signature).is_ok())
    }

    /// PUBLICATION → persist (spec.md §4.9's dispatch table).
    async fn handle_publication(&self, p: Publication) -> Result<(), ClientError> {
        let row = PublicationMessageRow {
            publisher_public_key: p.publisher_public_key.to_vec(),
            nym: p.nym,
            cuckoo_filter: p.cuckoo_filter,
            nb_docs: p.nb_docs as i64,
            created_at: chrono::Utc::now(),
        };
        self.repository.save_publication_message(&row).await?;
        Ok(())
    }

    async fn reindex_addresses(&self, conversation_id: &str, conversation: &Conversation) {
        let mut index = self.address_index.lock().await;
        index.retain(|_, id| id != conversation_id);
        for address in conversation.listening_addresses() {
            index.insert(*address, conversation_id.to_string());
        }
    }
}

fn last_message(conversation: &Conversation) -> dsnet_store::models::MessageRow {
    conversation.messages.last().cloned().expect("try_ingest just pushed one")
}
