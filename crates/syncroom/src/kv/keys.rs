// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified key/subject builder for the KV and pub-sub port.
//!
//! Ported from the Redis key-builder convention used by comparable
//! watch-party systems (`{prefix}:room:{id}:state`, …) to the NATS
//! subject/key scheme this hub's KV port uses instead. All IDs are
//! opaque, caller-supplied strings.

#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    // ---- Room state (spec §4.3 key table) ----------------------------

    pub fn rooms_all(&self) -> String {
        format!("{}.rooms.all", self.prefix)
    }

    pub fn room_meta(&self, room_id: &str) -> String {
        format!("{}.room.{room_id}.meta", self.prefix)
    }

    pub fn room_users(&self, room_id: &str) -> String {
        format!("{}.room.{room_id}.users", self.prefix)
    }

    pub fn room_video(&self, room_id: &str) -> String {
        format!("{}.room.{room_id}.video", self.prefix)
    }

    pub fn room_cursors(&self, room_id: &str) -> String {
        format!("{}.room.{room_id}.cursors", self.prefix)
    }

    // ---- Rate limiting (spec §4.2) ------------------------------------

    pub fn rate_limit(&self, action: &str, user_id: &str) -> String {
        format!("{}.ratelimit.{action}.{user_id}", self.prefix)
    }

    // ---- Pub/sub channels -----------------------------------------------

    pub fn room_channel(&self, room_id: &str) -> String {
        format!("{}.room.{room_id}.broadcast", self.prefix)
    }
}
