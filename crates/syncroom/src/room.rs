// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room manager (spec §4.3): authoritative store of rooms, membership,
//! playback state, and cursors, built entirely over [`KvPort`].

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::kv::{KeyBuilder, KvPort};
use crate::model::{
    clamp_percent, Cursor, Room, RoomOptions, RoomSummary, User, VideoState, DEFAULT_DURATION_SECS,
    DEFAULT_MAX_USERS, MAIN_LOBBY_ID, SYSTEM_CREATOR,
};

/// Membership, cursors, and video state carry the room's TTL and are
/// refreshed on every write (spec §3 Lifecycle).
const ROOM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A room with zero members is eligible for reaping once it has existed
/// this long (spec §4.3 `cleanupEmptyRooms`).
const EMPTY_ROOM_MIN_AGE: Duration = Duration::from_secs(60);

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Clone)]
pub struct RoomManager {
    kv: KvPort,
    keys: KeyBuilder,
}

impl RoomManager {
    pub fn new(kv: KvPort, keys: KeyBuilder) -> Self {
        Self { kv, keys }
    }

    /// Idempotent: the first writer's room wins a concurrent create for the
    /// same id (spec §3, §8 idempotence property).
    pub async fn create_room(&self, id: &str, creator: &str, opts: RoomOptions) -> Room {
        if let Some(existing) = self.get_room(id).await {
            return existing;
        }
        let room = Room {
            id: id.to_owned(),
            name: opts.name.unwrap_or_else(|| format!("Room {id}")),
            created_by: creator.to_owned(),
            created_at: now_ms(),
            max_users: opts.max_users.unwrap_or(DEFAULT_MAX_USERS),
            is_public: opts.is_public.unwrap_or(true),
            duration_override: opts.duration_override,
        };
        self.persist_room(&room).await;
        room
    }

    async fn persist_room(&self, room: &Room) {
        if let Ok(serialized) = serde_json::to_string(room) {
            self.kv.hash_set(&self.keys.rooms_all(), &room.id, &serialized).await;
            self.kv.set_with_ttl(&self.keys.room_meta(&room.id), &serialized, ROOM_TTL).await;
        }
    }

    pub async fn get_room(&self, id: &str) -> Option<Room> {
        if let Some(raw) = self.kv.get(&self.keys.room_meta(id)).await {
            return serde_json::from_str(&raw).ok();
        }
        // Fall back to the all-rooms hash; the dedicated meta key may have
        // expired while the room is still referenced elsewhere.
        let all = self.kv.hash_get_all(&self.keys.rooms_all()).await;
        all.into_iter().find(|(k, _)| k == id).and_then(|(_, v)| serde_json::from_str(&v).ok())
    }

    pub async fn get_all_rooms(&self) -> Vec<Room> {
        self.kv
            .hash_get_all(&self.keys.rooms_all())
            .await
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_str(&v).ok())
            .collect()
    }

    /// Rooms enriched with a live user count, for `rooms:list` (spec §4.5).
    pub async fn list_room_summaries(&self) -> Vec<RoomSummary> {
        let rooms = self.get_all_rooms().await;
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let user_count = self.get_room_user_count(&room.id).await;
            summaries.push(RoomSummary { room, user_count });
        }
        summaries
    }

    /// Best-effort: individual key failures do not abort the others (spec
    /// §4.3 `deleteRoom`).
    pub async fn delete_room(&self, id: &str) {
        self.kv.hash_del(&self.keys.rooms_all(), id).await;
        self.kv.delete(&self.keys.room_meta(id)).await;
        self.kv.delete(&self.keys.room_users(id)).await;
        self.kv.delete(&self.keys.room_video(id)).await;
        self.kv.delete(&self.keys.room_cursors(id)).await;
    }

    pub async fn add_user_to_room(&self, id: &str, user: &User) {
        if let Ok(serialized) = serde_json::to_string(user) {
            let key = self.keys.room_users(id);
            self.kv.hash_set(&key, &user.id, &serialized).await;
        }
    }

    pub async fn remove_user_from_room(&self, id: &str, user_id: &str) {
        self.kv.hash_del(&self.keys.room_users(id), user_id).await;
        self.kv.hash_del(&self.keys.room_cursors(id), user_id).await;
    }

    pub async fn get_room_users(&self, id: &str) -> HashMap<String, User> {
        self.kv
            .hash_get_all(&self.keys.room_users(id))
            .await
            .into_iter()
            .filter_map(|(k, v)| serde_json::from_str::<User>(&v).ok().map(|u| (k, u)))
            .collect()
    }

    pub async fn get_room_user_count(&self, id: &str) -> usize {
        self.kv.hash_len(&self.keys.room_users(id)).await
    }

    fn default_duration(&self, room: Option<&Room>) -> f64 {
        room.and_then(|r| r.duration_override).unwrap_or(DEFAULT_DURATION_SECS)
    }

    /// Default state if absent (spec §3: paused, t=0, duration=596 unless
    /// the room overrides it).
    pub async fn get_video_state(&self, id: &str) -> VideoState {
        if let Some(raw) = self.kv.get(&self.keys.room_video(id)).await {
            if let Ok(state) = serde_json::from_str(&raw) {
                return state;
            }
        }
        let room = self.get_room(id).await;
        VideoState::default_for(self.default_duration(room.as_ref()), now_ms())
    }

    async fn persist_video_state(&self, id: &str, state: &VideoState) {
        if let Ok(serialized) = serde_json::to_string(state) {
            self.kv.set_with_ttl(&self.keys.room_video(id), &serialized, ROOM_TTL).await;
        }
    }

    /// Merge `mutate` onto the current state, stamping `serverTimestamp`
    /// with the current time, and persist (spec §4.3 `setVideoState`).
    pub async fn set_video_state(&self, id: &str, mutate: impl FnOnce(&mut VideoState)) -> VideoState {
        let mut state = self.get_video_state(id).await;
        mutate(&mut state);
        state.server_timestamp = now_ms();
        self.persist_video_state(id, &state).await;
        state
    }

    /// Advances `currentTime` if playing, loops at `duration`, refreshes
    /// both timestamps, and persists (spec §4.3 `updateVideoTime`).
    pub async fn update_video_time(&self, id: &str) -> VideoState {
        let mut state = self.get_video_state(id).await;
        state.advance(now_ms());
        self.persist_video_state(id, &state).await;
        state
    }

    pub async fn update_cursor(&self, id: &str, user_id: &str, mut cursor: Cursor) {
        cursor.x = clamp_percent(cursor.x);
        cursor.y = clamp_percent(cursor.y);
        if let Ok(serialized) = serde_json::to_string(&cursor) {
            self.kv.hash_set(&self.keys.room_cursors(id), user_id, &serialized).await;
        }
    }

    pub async fn get_room_cursors(&self, id: &str) -> HashMap<String, Cursor> {
        self.kv
            .hash_get_all(&self.keys.room_cursors(id))
            .await
            .into_iter()
            .filter_map(|(k, v)| serde_json::from_str::<Cursor>(&v).ok().map(|c| (k, c)))
            .collect()
    }

    pub async fn remove_cursor(&self, id: &str, user_id: &str) {
        self.kv.hash_del(&self.keys.room_cursors(id), user_id).await;
    }

    /// Deletes every room with zero members whose age exceeds
    /// [`EMPTY_ROOM_MIN_AGE`] (spec §4.3, §4.7).
    pub async fn cleanup_empty_rooms(&self) {
        let now = now_ms();
        for room in self.get_all_rooms().await {
            if room.id == MAIN_LOBBY_ID {
                continue;
            }
            let age = Duration::from_millis(now.saturating_sub(room.created_at));
            if age < EMPTY_ROOM_MIN_AGE {
                continue;
            }
            if self.get_room_user_count(&room.id).await == 0 {
                debug!(room_id = %room.id, "reaping empty room");
                self.delete_room(&room.id).await;
            }
        }
    }

    /// Creates `main-lobby` with the system creator if absent (spec §4.3).
    pub async fn ensure_default_room(&self) {
        if self.get_room(MAIN_LOBBY_ID).await.is_some() {
            return;
        }
        self.create_room(
            MAIN_LOBBY_ID,
            SYSTEM_CREATOR,
            RoomOptions { name: Some("Main Lobby".to_owned()), max_users: Some(100_000), is_public: Some(true), duration_override: None },
        )
        .await;
    }
}
