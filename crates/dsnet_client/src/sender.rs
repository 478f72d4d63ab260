//! Message senders (spec.md §4.5, C6): a direct immediate sender, and a
//! rate-shaped cover-traffic queue that emits indistinguishable dummy
//! traffic between real sends.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::sync::{mpsc, Mutex};

use dsnet_crypto::ratchet::PH_MESSAGE_LENGTH;

use crate::config::CoverTrafficConfig;
use crate::error::ClientError;

#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, address: [u8; 32], ciphertext: Vec<u8>) -> Result<(), ClientError>;
}

/// Posts directly to `/ph/{addressHex}`, no queueing.
pub struct DirectMessageSender {
    http: reqwest::Client,
    server_url: String,
}

impl DirectMessageSender {
    pub fn new(http: reqwest::Client, server_url: String) -> Self {
        Self { http, server_url }
    }
}

#[async_trait::async_trait]
impl MessageSender for DirectMessageSender {
    async fn send(&self, address: [u8; 32], ciphertext: Vec<u8>) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(format!("{}/ph/{}", self.server_url, hex::encode(address)))
            .body(ciphertext)
            .send()
            .await
            .map_err(|e| ClientError::TransportTransient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::TransportTransient(format!("ph POST returned {}", resp.status())));
        }
        tracing::debug!(target: "dsnet_client", event = "message_sent", address = %hex::encode(address));
        Ok(())
    }
}

struct QueuedMessage {
    address: [u8; 32],
    ciphertext: Vec<u8>,
}

/// Rate-shaped cover-traffic queue (spec.md §4.5): real sends are queued;
/// a background task drains the queue on an exponentially distributed
/// schedule (`arrival_rate` mean seconds between ticks, `distribution()`),
/// and emits a cover message — random address, uniformly random
/// `PH_MESSAGE_LENGTH` ciphertext — whenever no real message is pending.
pub struct CoverTrafficSender {
    queue_tx: mpsc::UnboundedSender<QueuedMessage>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CoverTrafficSender {
    pub fn spawn(inner: Arc<DirectMessageSender>, config: CoverTrafficConfig) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<QueuedMessage>();

        let worker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(distribution(config.arrival_rate)).await;

                let queued = queue_rx.try_recv().ok();
                let (address, ciphertext) = match queued {
                    Some(msg) => (msg.address, msg.ciphertext),
                    None => cover_message(),
                };

                if let Err(err) = inner.send(address, ciphertext).await {
                    tracing::warn!(target: "dsnet_client", event = "cover_traffic_send_failed", error = %err);
                }

                if queue_rx.is_closed() && queue_rx.is_empty() {
                    break;
                }
            }
        });

        Self {
            queue_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue a real message for the next tick.
    pub fn enqueue(&self, address: [u8; 32], ciphertext: Vec<u8>) -> Result<(), ClientError> {
        self.queue_tx
            .send(QueuedMessage { address, ciphertext })
            .map_err(|_| ClientError::TransportTransient("cover traffic worker stopped".into()))
    }

    /// Stop accepting new sends and drain the queue before the worker
    /// exits (spec.md §4.5's "graceful drain-then-exit").
    pub async fn shutdown(self) {
        drop(self.queue_tx);
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

/// Draw an exponentially distributed delay with the given mean (seconds),
/// via inverse-CDF sampling: `-ln(U) / rate`.
fn distribution(arrival_rate: f64) -> Duration {
    let mut rng = rand::thread_rng();
    let u: f64 = loop {
        let candidate = rng.next_u64() as f64 / u64::MAX as f64;
        if candidate > 0.0 {
            break candidate;
        }
    };
    let seconds = -u.ln() / arrival_rate.max(f64::MIN_POSITIVE);
    Duration::from_secs_f64(seconds.clamp(0.0, 60.0))
}

fn cover_message() -> ([u8; 32], Vec<u8>) {
    let mut rng = rand::thread_rng();
    let mut address = [0u8; 32];
    rng.fill_bytes(&mut address);
    let mut ciphertext = vec![0u8; PH_MESSAGE_LENGTH];
    rng.fill_bytes(&mut ciphertext);
    (address, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_message_has_fixed_length() {
        let (_, ciphertext) = cover_message();
        assert_eq!(ciphertext.len(), PH_MESSAGE_LENGTH);
    }

    #[test]
    fn distribution_never_exceeds_clamp() {
        for _ in 0..1000 {
            assert!(distribution(5.0) <= Duration::from_secs(60));
        }
    }
}
