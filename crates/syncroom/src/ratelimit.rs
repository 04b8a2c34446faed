// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate limiting (spec §4.2): a KV-backed fixed-window counter per
//! `(action, user)`, an optional local token bucket for burst smoothing,
//! and a per-source-address connection admission gate.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::kv::{KeyBuilder, KvPort};

/// A named rate-limited action with its `(max, window)` budget (spec §4.2's
/// table). `message` is reserved for a future transport and currently
/// unused by any dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Cursor,
    Reaction,
    Sync,
    Message,
    RoomJoin,
    VideoControl,
}

impl Action {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Cursor => "cursor",
            Self::Reaction => "reaction",
            Self::Sync => "sync",
            Self::Message => "message",
            Self::RoomJoin => "roomJoin",
            Self::VideoControl => "videoControl",
        }
    }

    /// `(max, window)` per spec §4.2.
    pub fn budget(&self) -> (u64, Duration) {
        match self {
            Self::Cursor => (20, Duration::from_secs(1)),
            Self::Reaction => (5, Duration::from_secs(1)),
            Self::Sync => (10, Duration::from_secs(1)),
            Self::Message => (30, Duration::from_secs(1)),
            Self::RoomJoin => (5, Duration::from_secs(10)),
            Self::VideoControl => (10, Duration::from_secs(1)),
        }
    }
}

/// Returned to the caller on denial; the hub forwards this verbatim to the
/// originating session (spec §4.2).
#[derive(Debug, Clone)]
pub struct Denial {
    pub action: &'static str,
    pub retry_in: Duration,
}

#[derive(Debug)]
struct LocalCounter {
    count: u64,
    reset_at: Instant,
}

/// Fixed-window counter: KV-backed when the port is connected, falling back
/// to a process-local map with identical semantics when it is not (spec
/// §4.2, §7).
pub struct FixedWindowLimiter {
    kv: KvPort,
    keys: KeyBuilder,
    local: RwLock<HashMap<String, LocalCounter>>,
}

impl FixedWindowLimiter {
    pub fn new(kv: KvPort, keys: KeyBuilder) -> Self {
        Self { kv, keys, local: RwLock::new(HashMap::new()) }
    }

    /// Check and consume one unit of `action`'s budget for `user_id`.
    pub async fn check(&self, action: Action, user_id: &str) -> Result<(), Denial> {
        let (max, window) = action.budget();
        let count = if self.kv.connected() {
            let key = self.keys.rate_limit(action.key(), user_id);
            self.kv.increment_with_ttl(&key, window).await
        } else {
            self.check_local(action, user_id, window).await
        };

        if count <= max {
            Ok(())
        } else {
            Err(Denial { action: action.key(), retry_in: window })
        }
    }

    async fn check_local(&self, action: Action, user_id: &str, window: Duration) -> u64 {
        let key = format!("{}:{user_id}", action.key());
        let mut local = self.local.write().await;
        let now = Instant::now();
        let entry = local.entry(key).or_insert_with(|| LocalCounter { count: 0, reset_at: now + window });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;
        entry.count
    }

    /// Drop local entries whose window has already elapsed (10s cadence,
    /// spec §4.2).
    pub async fn sweep_local(&self) {
        let now = Instant::now();
        let mut local = self.local.write().await;
        local.retain(|_, entry| entry.reset_at > now);
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(max: u64, window: Duration) -> Self {
        let capacity = 2.0 * max as f64;
        let refill_per_sec = max as f64 / window.as_secs_f64();
        Self { tokens: capacity, capacity, refill_per_sec, last_refill: Instant::now() }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Local-only token bucket burst-smoothing path (spec §4.2). Not
/// cluster-aware; used as an additional local check layered on top of the
/// fixed-window counter, never in place of it.
pub struct TokenBucketLimiter {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self { buckets: RwLock::new(HashMap::new()) }
    }

    pub async fn check(&self, action: Action, user_id: &str) -> Result<(), Denial> {
        let (max, window) = action.budget();
        let key = format!("{}:{user_id}", action.key());
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(key).or_insert_with(|| Bucket::new(max, window));
        if bucket.try_take() {
            Ok(())
        } else {
            Err(Denial { action: action.key(), retry_in: window })
        }
    }
}

/// Per-source-address connection admission gate: a sliding window of
/// connection attempts within the last 60s, admitting iff the count stays
/// below `threshold` (spec §4.2).
pub struct ConnectionGate {
    threshold: usize,
    window: Duration,
    attempts: RwLock<HashMap<IpAddr, Vec<Instant>>>,
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ConnectionGate {
    pub fn new(threshold: usize) -> Self {
        Self { threshold, window: Duration::from_secs(60), attempts: RwLock::new(HashMap::new()) }
    }

    /// Record and admit an attempt from `ip`. Returns `false` when the
    /// sliding-window count already meets `threshold`.
    pub async fn admit(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        let entry = attempts.entry(ip).or_default();
        entry.retain(|t| now.saturating_duration_since(*t) < self.window);
        if entry.len() >= self.threshold {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drop expired attempt timestamps and empty entries (60s cadence).
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, entry| {
            entry.retain(|t| now.saturating_duration_since(*t) < self.window);
            !entry.is_empty()
        });
    }
}
