// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub / session layer (spec §4.5): accepts persistent bidirectional
//! connections, owns each connection's session state machine, dispatches
//! inbound messages through the rate limiter to the room manager and
//! batcher, and subscribes sessions to room broadcasts via the pub/sub
//! port.

pub mod dispatch;
pub mod msg;
pub mod session;
pub mod ws;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::batcher::Batcher;
use crate::kv::{KeyBuilder, KvPort};
use crate::ratelimit::{ConnectionGate, FixedWindowLimiter, TokenBucketLimiter};
use crate::room::RoomManager;

/// Shared application state passed to every axum handler via the `State`
/// extractor, and to the periodic drivers.
pub struct Hub {
    pub kv: KvPort,
    pub keys: KeyBuilder,
    pub rooms: RoomManager,
    pub batcher: Batcher,
    pub rate_limiter: FixedWindowLimiter,
    pub token_buckets: TokenBucketLimiter,
    pub connection_gate: ConnectionGate,
    pub instance_id: String,
    pub started_at: Instant,
    /// Monotonic counter feeding reaction id allocation (spec §3: globally
    /// unique, derived from a monotonic counter plus ms plus random suffix).
    pub reaction_seq: AtomicI64,
}

impl Hub {
    pub fn new(kv: KvPort, prefix: &str, instance_id: String) -> Arc<Self> {
        let keys = KeyBuilder::new(prefix);
        Arc::new(Self {
            rooms: RoomManager::new(kv.clone(), keys.clone()),
            rate_limiter: FixedWindowLimiter::new(kv.clone(), keys.clone()),
            token_buckets: TokenBucketLimiter::new(),
            connection_gate: ConnectionGate::default(),
            batcher: Batcher::new(),
            kv,
            keys,
            instance_id,
            started_at: Instant::now(),
            reaction_seq: AtomicI64::new(0),
        })
    }

    pub fn next_reaction_id(&self) -> String {
        let seq = self.reaction_seq.fetch_add(1, Ordering::Relaxed);
        let now = crate::room::now_ms();
        let suffix: u32 = rand::random();
        format!("reaction_{seq}_{now}_{:06x}", suffix % 0x1_000_000)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
