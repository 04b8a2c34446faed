// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-room cursor and reaction batchers (spec §4.4): accumulate updates in
//! process memory on the owning instance, flushed on a fixed cadence by a
//! periodic driver. One mutex per `(room, kind)`; the flusher swaps the
//! accumulator out under the lock and publishes after releasing it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::model::{Cursor, Reaction};

#[derive(Default)]
struct RoomBatches {
    cursors: Mutex<IndexMap<String, Cursor>>,
    reactions: Mutex<Vec<Reaction>>,
}

/// Holds one [`RoomBatches`] per room, created lazily on first use.
#[derive(Clone, Default)]
pub struct Batcher {
    rooms: Arc<Mutex<HashMap<String, Arc<RoomBatches>>>>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn room(&self, room_id: &str) -> Arc<RoomBatches> {
        let mut rooms = self.rooms.lock().await;
        rooms.entry(room_id.to_owned()).or_default().clone()
    }

    /// Last-write-wins insert/update for `cursor.user_id` (spec §4.4).
    pub async fn push_cursor(&self, room_id: &str, cursor: Cursor) {
        let room = self.room(room_id).await;
        let mut cursors = room.cursors.lock().await;
        cursors.insert(cursor.user_id.clone(), cursor);
    }

    /// Append-only; insertion order is preserved in the flushed batch.
    pub async fn push_reaction(&self, room_id: &str, reaction: Reaction) {
        let room = self.room(room_id).await;
        let mut reactions = room.reactions.lock().await;
        reactions.push(reaction);
    }

    /// Swaps out the accumulated cursors for `room_id`. Returns `None` when
    /// the batch is empty — empty batches are skipped, not flushed (spec
    /// §4.4).
    pub async fn flush_cursors(&self, room_id: &str) -> Option<Vec<Cursor>> {
        let room = self.room(room_id).await;
        let mut cursors = room.cursors.lock().await;
        if cursors.is_empty() {
            return None;
        }
        let drained = std::mem::take(&mut *cursors).into_values().collect();
        Some(drained)
    }

    pub async fn flush_reactions(&self, room_id: &str) -> Option<Vec<Reaction>> {
        let room = self.room(room_id).await;
        let mut reactions = room.reactions.lock().await;
        if reactions.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut *reactions))
    }

    /// Rooms currently holding any accumulator, used by periodic drivers to
    /// avoid flushing rooms with no pending activity and no membership.
    pub async fn known_rooms(&self) -> Vec<String> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    /// Drops a room's accumulators entirely, called alongside room deletion.
    pub async fn forget_room(&self, room_id: &str) {
        self.rooms.lock().await.remove(room_id);
    }
}
