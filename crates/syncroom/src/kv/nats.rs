// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clustered backend for [`super::KvPort`]: NATS core pub/sub for
//! broadcasts plus a JetStream KV bucket for durable room state (spec
//! §4.1). Every instance in a fleet shares one bucket and subject
//! namespace, so a message published from any instance reaches sessions
//! connected to any other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_nats::jetstream;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::Subscription;

const BROADCAST_CAPACITY: usize = 256;
const KV_BUCKET: &str = "syncroom_state";

/// Clustered KV/pub-sub store backed by a NATS connection and a JetStream
/// KV bucket.
#[derive(Clone)]
pub struct NatsStore {
    client: async_nats::Client,
    kv: jetstream::kv::Store,
    connected: Arc<AtomicBool>,
    /// One relay task per subject this instance has subscribed to, feeding
    /// a local broadcast channel so [`KvPort::subscribe`]'s signature stays
    /// synchronous like the memory backend's. A plain `std::sync::Mutex`
    /// rather than the async lock used elsewhere in this file: `subscribe`
    /// must stay a non-async fn, so it can only take locks it can acquire
    /// without suspending.
    relays: Arc<StdMutex<HashMap<String, broadcast::Sender<Bytes>>>>,
}

impl NatsStore {
    /// Connect to `url`, creating (or reusing) the shared KV bucket.
    /// Reconnection is handled by `async-nats` itself; `connected` tracks
    /// the client's self-reported state for health reporting (spec §7).
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let connected = Arc::new(AtomicBool::new(false));
        let flag = connected.clone();
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .max_reconnects(10)
            .reconnect_delay_callback(|attempt| {
                Duration::from_millis(200 * (attempt as u64 + 1)).min(Duration::from_secs(3))
            })
            .event_callback(move |event| {
                let flag = flag.clone();
                async move {
                    match event {
                        async_nats::Event::Connected => flag.store(true, Ordering::SeqCst),
                        async_nats::Event::Disconnected => flag.store(false, Ordering::SeqCst),
                        _ => {}
                    }
                }
            })
            .connect(url)
            .await?;
        connected.store(true, Ordering::SeqCst);

        let js = jetstream::new(client.clone());
        let kv = match js.get_key_value(KV_BUCKET).await {
            Ok(store) => store,
            Err(_) => {
                js.create_key_value(jetstream::kv::Config {
                    bucket: KV_BUCKET.to_owned(),
                    ..Default::default()
                })
                .await?
            }
        };

        Ok(Self { client, kv, connected, relays: Arc::new(StdMutex::new(HashMap::new())) })
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.kv.get(key).await {
            Ok(Some(bytes)) => String::from_utf8(bytes.to_vec()).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "kv get failed");
                None
            }
        }
    }

    /// JetStream KV has no native per-key TTL; when `ttl` is non-zero we
    /// spawn a delayed delete instead. Acceptable for rate-limit windows,
    /// which are short-lived by construction.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(err) = self.kv.put(key, Bytes::copy_from_slice(value.as_bytes())).await {
            warn!(%key, error = %err, "kv put failed");
            return;
        }
        if !ttl.is_zero() {
            let kv = self.kv.clone();
            let key = key.to_owned();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let _ = kv.delete(&key).await;
            });
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.kv.delete(key).await {
            debug!(%key, error = %err, "kv delete failed (likely absent)");
        }
    }

    /// Hashes are stored as a single JSON object per key; field-level
    /// mutation reads, patches, and writes back. Good enough for room
    /// membership maps, which see low write concurrency per room.
    pub async fn hash_set(&self, key: &str, field: &str, value: &str) {
        let mut map = self.load_hash(key).await;
        map.insert(field.to_owned(), value.to_owned());
        self.store_hash(key, &map).await;
    }

    pub async fn hash_get_all(&self, key: &str) -> Vec<(String, String)> {
        self.load_hash(key).await.into_iter().collect()
    }

    pub async fn hash_del(&self, key: &str, field: &str) {
        let mut map = self.load_hash(key).await;
        map.remove(field);
        self.store_hash(key, &map).await;
    }

    pub async fn hash_len(&self, key: &str) -> usize {
        self.load_hash(key).await.len()
    }

    async fn load_hash(&self, key: &str) -> HashMap<String, String> {
        match self.kv.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
            _ => HashMap::new(),
        }
    }

    async fn store_hash(&self, key: &str, map: &HashMap<String, String>) {
        if let Ok(bytes) = serde_json::to_vec(map) {
            if let Err(err) = self.kv.put(key, Bytes::from(bytes)).await {
                warn!(%key, error = %err, "kv hash store failed");
            }
        }
    }

    /// Fixed-window counter (spec §4.2): increments a JSON-encoded counter
    /// and re-arms its delete on the write that takes it to 1.
    pub async fn increment_with_ttl(&self, key: &str, window: Duration) -> u64 {
        let current: u64 = match self.kv.get(key).await {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes).ok().and_then(|s| s.parse().ok()).unwrap_or(0),
            _ => 0,
        };
        let next = current + 1;
        if let Err(err) = self.kv.put(key, Bytes::from(next.to_string())).await {
            warn!(%key, error = %err, "kv increment failed");
        }
        if next == 1 {
            let kv = self.kv.clone();
            let key = key.to_owned();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                let _ = kv.delete(&key).await;
            });
        }
        next
    }

    /// Sorted sets are stored as a JSON array of `(score, member)` pairs,
    /// kept sorted on every write. Used for the time-exchange samples and
    /// cursor recency tracking (spec §4.6, §4.4) where set sizes are small.
    pub async fn sorted_set_add(&self, key: &str, member: &str, score: f64) {
        let mut set = self.load_sorted_set(key).await;
        set.retain(|(_, m)| m != member);
        let pos = set.partition_point(|(s, _)| *s < score);
        set.insert(pos, (score, member.to_owned()));
        if let Ok(bytes) = serde_json::to_vec(&set) {
            if let Err(err) = self.kv.put(key, Bytes::from(bytes)).await {
                warn!(%key, error = %err, "kv sorted set store failed");
            }
        }
    }

    pub async fn sorted_set_range(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        self.load_sorted_set(key)
            .await
            .into_iter()
            .filter(|(s, _)| *s >= min && *s <= max)
            .map(|(_, m)| m)
            .collect()
    }

    async fn load_sorted_set(&self, key: &str) -> Vec<(f64, String)> {
        match self.kv.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub async fn publish(&self, channel: &str, payload: Bytes) {
        if let Err(err) = self.client.publish(channel.to_owned(), payload).await {
            warn!(%channel, error = %err, "nats publish failed");
        }
    }

    /// Subscribe to `channel`. The first caller for a given channel
    /// registers a local broadcast sender and spawns a relay task that
    /// forwards the NATS subscription into it; later callers just tap into
    /// the existing sender. Synchronous by construction: the registration
    /// lock is a `std::sync::Mutex`, so this never suspends and is safe to
    /// call from any runtime flavor.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let mut guard = self.relays.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = guard.get(channel) {
            return tx.subscribe();
        }
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        guard.insert(channel.to_owned(), tx.clone());
        drop(guard);

        let client = self.client.clone();
        let channel = channel.to_owned();
        tokio::spawn(async move {
            match client.subscribe(channel.clone()).await {
                Ok(mut sub) => {
                    while let Some(message) = sub.next().await {
                        if tx.send(message.payload).is_err() {
                            break;
                        }
                    }
                }
                Err(err) => warn!(%channel, error = %err, "nats subscribe failed"),
            }
        });
        rx
    }
}
