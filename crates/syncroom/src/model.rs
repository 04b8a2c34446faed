// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data model shared by the room manager, batcher, and hub (spec §3).

use serde::{Deserialize, Serialize};

/// Default playback duration (seconds) for a freshly created room's video
/// state, derived from the reference asset. Per-room, overridable.
pub const DEFAULT_DURATION_SECS: f64 = 596.0;

/// Default room capacity.
pub const DEFAULT_MAX_USERS: u32 = 10_000;

/// Literal creator id used for system-created rooms (e.g. the default lobby).
pub const SYSTEM_CREATOR: &str = "system";

/// The id of the room every session joins absent an explicit `room` query
/// parameter.
pub const MAIN_LOBBY_ID: &str = "main-lobby";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: u64,
    pub max_users: u32,
    pub is_public: bool,
    /// Per-room override of `VideoState.duration`. `None` uses
    /// [`DEFAULT_DURATION_SECS`].
    #[serde(default)]
    pub duration_override: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptions {
    pub name: Option<String>,
    pub max_users: Option<u32>,
    pub is_public: Option<bool>,
    pub duration_override: Option<f64>,
}

/// A room enriched with a live member count, returned by `rooms:list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: Room,
    pub user_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub city: String,
    pub timezone: String,
    pub flag: String,
    pub connected_at: u64,
    pub last_seen: u64,
    pub instance: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub server_timestamp: u64,
    pub last_update_time: u64,
}

impl VideoState {
    /// Default state for a room whose video state has never been written:
    /// paused, at the start, with the room's resolved duration.
    pub fn default_for(duration: f64, now_ms: u64) -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration,
            server_timestamp: now_ms,
            last_update_time: now_ms,
        }
    }

    /// The expected playback position at wall-clock `now_ms`, per spec §3:
    /// `min(currentTime + elapsed, duration)`, wrapping to 0 at `duration`.
    pub fn expected_position(&self, now_ms: u64) -> f64 {
        if !self.is_playing {
            return self.current_time;
        }
        let elapsed_secs = now_ms.saturating_sub(self.last_update_time) as f64 / 1000.0;
        let advanced = self.current_time + elapsed_secs;
        if self.duration <= 0.0 {
            return 0.0;
        }
        if advanced >= self.duration {
            advanced % self.duration
        } else {
            advanced
        }
    }

    /// Advance `current_time` to `now_ms` if playing, looping at `duration`,
    /// and refresh both timestamps. No-op (besides refreshing
    /// `server_timestamp`) when paused. Spec §4.3 `updateVideoTime`.
    pub fn advance(&mut self, now_ms: u64) {
        if self.is_playing {
            self.current_time = self.expected_position(now_ms);
            self.last_update_time = now_ms;
        }
        self.server_timestamp = now_ms;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub user_id: String,
    pub city: String,
    pub flag: String,
    pub x: f64,
    pub y: f64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub user_id: String,
    pub city: String,
    pub flag: String,
    pub emoji: String,
    pub x: f64,
    pub y: f64,
    pub video_time: f64,
    pub timestamp: u64,
}

/// Clamp `x`/`y` percentages into the documented `[0, 100]` range (spec §3).
pub fn clamp_percent(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}
