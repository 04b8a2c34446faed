// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standalone fallback backend for [`super::KvPort`]: an in-process store
//! with no cross-instance visibility, used when `--nats-url` is unset or the
//! clustered backend is unreachable (spec §4.1, §7).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};

use super::Subscription;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct Counter {
    count: u64,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, Vec<(f64, String)>>,
    counters: HashMap<String, Counter>,
}

/// In-process KV/pub-sub store. All state lives behind a single `RwLock`;
/// this is a correctness fallback, not a performance target. Broadcast
/// channels live in their own `std::sync::Mutex` rather than the async
/// `Inner` lock so that [`subscribe`](Self::subscribe) can stay a plain
/// synchronous function instead of reaching back into the Tokio runtime.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    channels: Arc<StdMutex<HashMap<String, broadcast::Sender<Bytes>>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(Inner::default())), channels: Arc::new(StdMutex::new(HashMap::new())) }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.values.get(key).filter(|e| e.is_live()).map(|e| e.value.clone())
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        let expires_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        let mut inner = self.inner.write().await;
        inner.values.insert(key.to_owned(), Entry { value: value.to_owned(), expires_at });
    }

    pub async fn delete(&self, key: &str) {
        let mut inner = self.inner.write().await;
        inner.values.remove(key);
        inner.hashes.remove(key);
        inner.sorted_sets.remove(key);
        inner.counters.remove(key);
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) {
        let mut inner = self.inner.write().await;
        inner.hashes.entry(key.to_owned()).or_default().insert(field.to_owned(), value.to_owned());
    }

    pub async fn hash_get_all(&self, key: &str) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        inner
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub async fn hash_del(&self, key: &str, field: &str) {
        let mut inner = self.inner.write().await;
        if let Some(h) = inner.hashes.get_mut(key) {
            h.remove(field);
        }
    }

    pub async fn hash_len(&self, key: &str) -> usize {
        let inner = self.inner.read().await;
        inner.hashes.get(key).map(|h| h.len()).unwrap_or(0)
    }

    pub async fn increment_with_ttl(&self, key: &str, window: Duration) -> u64 {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let counter = inner.counters.entry(key.to_owned()).or_default();
        let expired = counter.expires_at.map(|at| now >= at).unwrap_or(true);
        if expired {
            counter.count = 0;
            counter.expires_at = None;
        }
        counter.count += 1;
        if counter.count == 1 {
            counter.expires_at = Some(now + window);
        }
        counter.count
    }

    pub async fn sorted_set_add(&self, key: &str, member: &str, score: f64) {
        let mut inner = self.inner.write().await;
        let set = inner.sorted_sets.entry(key.to_owned()).or_default();
        set.retain(|(_, m)| m != member);
        let pos = set.partition_point(|(s, _)| *s < score);
        set.insert(pos, (score, member.to_owned()));
    }

    pub async fn sorted_set_range(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .sorted_sets
            .get(key)
            .map(|set| set.iter().filter(|(s, _)| *s >= min && *s <= max).map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn publish(&self, channel: &str, payload: Bytes) {
        let channels = self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = channels.get(channel) {
            // No subscribers yet is not an error; the message simply has no
            // listeners for this instance.
            let _ = tx.send(payload);
        }
    }

    /// Synchronous by design: channels live behind a `std::sync::Mutex`, so
    /// this never needs to suspend or reach into the async runtime.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let mut channels = self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = channels.get(channel) {
            return tx.subscribe();
        }
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        channels.insert(channel.to_owned(), tx);
        rx
    }
}
