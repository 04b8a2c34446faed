// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KV / pub-sub port (spec §4.1) — the single abstraction every other
//! component depends on instead of talking to NATS directly.
//!
//! Two concrete backends share one surface: [`memory::MemoryStore`] for a
//! standalone instance, and [`nats::NatsStore`] for a clustered deployment.
//! `KvPort` is a thin enum rather than a trait object — there are exactly
//! two backends and both are known at startup, so dynamic dispatch would
//! only cost a vtable indirection for nothing gained.

pub mod keys;
pub mod memory;
pub mod nats;

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

pub use keys::KeyBuilder;

/// A subscription handle: a broadcast receiver fed by the port's publish
/// path. Dropping it unsubscribes.
pub type Subscription = broadcast::Receiver<Bytes>;

/// Shared KV/pub-sub port. See module docs.
#[derive(Clone)]
pub enum KvPort {
    Nats(nats::NatsStore),
    Memory(memory::MemoryStore),
}

impl KvPort {
    /// Whether the clustered backend is currently reachable. A `Memory`
    /// port is always "connected" to itself; a disconnected `Nats` port
    /// means callers should have already fallen back (spec §4.1, §7).
    pub fn connected(&self) -> bool {
        match self {
            Self::Nats(n) => n.connected(),
            Self::Memory(_) => true,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Nats(n) => n.get(key).await,
            Self::Memory(m) => m.get(key).await,
        }
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        match self {
            Self::Nats(n) => n.set_with_ttl(key, value, ttl).await,
            Self::Memory(m) => m.set_with_ttl(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) {
        match self {
            Self::Nats(n) => n.delete(key).await,
            Self::Memory(m) => m.delete(key).await,
        }
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) {
        match self {
            Self::Nats(n) => n.hash_set(key, field, value).await,
            Self::Memory(m) => m.hash_set(key, field, value).await,
        }
    }

    pub async fn hash_get_all(&self, key: &str) -> Vec<(String, String)> {
        match self {
            Self::Nats(n) => n.hash_get_all(key).await,
            Self::Memory(m) => m.hash_get_all(key).await,
        }
    }

    pub async fn hash_del(&self, key: &str, field: &str) {
        match self {
            Self::Nats(n) => n.hash_del(key, field).await,
            Self::Memory(m) => m.hash_del(key, field).await,
        }
    }

    pub async fn hash_len(&self, key: &str) -> usize {
        match self {
            Self::Nats(n) => n.hash_len(key).await,
            Self::Memory(m) => m.hash_len(key).await,
        }
    }

    /// Increment a fixed-window counter. On the write that takes it to 1,
    /// sets a TTL of `window` (spec §4.2's fixed-window rate limiter).
    pub async fn increment_with_ttl(&self, key: &str, window: Duration) -> u64 {
        match self {
            Self::Nats(n) => n.increment_with_ttl(key, window).await,
            Self::Memory(m) => m.increment_with_ttl(key, window).await,
        }
    }

    pub async fn sorted_set_add(&self, key: &str, member: &str, score: f64) {
        match self {
            Self::Nats(n) => n.sorted_set_add(key, member, score).await,
            Self::Memory(m) => m.sorted_set_add(key, member, score).await,
        }
    }

    pub async fn sorted_set_range(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        match self {
            Self::Nats(n) => n.sorted_set_range(key, min, max).await,
            Self::Memory(m) => m.sorted_set_range(key, min, max).await,
        }
    }

    pub async fn publish(&self, channel: &str, payload: Bytes) {
        match self {
            Self::Nats(n) => n.publish(channel, payload).await,
            Self::Memory(m) => m.publish(channel, payload).await,
        }
    }

    pub fn subscribe(&self, channel: &str) -> Subscription {
        match self {
            Self::Nats(n) => n.subscribe(channel),
            Self::Memory(m) => m.subscribe(channel),
        }
    }
}
