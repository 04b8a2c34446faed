// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic drivers (spec §4.7): fixed-interval tasks running independently
//! of any single connection, each its own spawned loop under the shared
//! shutdown token.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::hub::msg::ServerMessage;
use crate::hub::Hub;
use crate::room::now_ms;

const CURSOR_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
const REACTION_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
const VIDEO_TICK_INTERVAL: Duration = Duration::from_millis(500);
const SERVER_TIME_INTERVAL: Duration = Duration::from_secs(1);
const EMPTY_ROOM_REAP_INTERVAL: Duration = Duration::from_secs(60);
const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const CONNECTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns every periodic driver as its own task under `shutdown`.
pub fn spawn_all(hub: Arc<Hub>, shutdown: CancellationToken) {
    spawn_loop(hub.clone(), shutdown.clone(), CURSOR_FLUSH_INTERVAL, |hub| flush_cursors(hub));
    spawn_loop(hub.clone(), shutdown.clone(), REACTION_FLUSH_INTERVAL, |hub| flush_reactions(hub));
    spawn_loop(hub.clone(), shutdown.clone(), VIDEO_TICK_INTERVAL, |hub| tick_video(hub));
    spawn_loop(hub.clone(), shutdown.clone(), SERVER_TIME_INTERVAL, |hub| broadcast_server_time(hub));
    spawn_loop(hub.clone(), shutdown.clone(), EMPTY_ROOM_REAP_INTERVAL, |hub| reap_empty_rooms(hub));
    spawn_loop(hub.clone(), shutdown.clone(), RATE_LIMIT_SWEEP_INTERVAL, |hub| sweep_rate_limits(hub));
    spawn_loop(hub.clone(), shutdown.clone(), CONNECTION_SWEEP_INTERVAL, |hub| sweep_connections(hub));
}

fn spawn_loop<F, Fut>(hub: Arc<Hub>, shutdown: CancellationToken, interval: Duration, tick: F)
where
    F: Fn(Arc<Hub>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => tick(hub.clone()).await,
            }
        }
    });
}

async fn publish(hub: &Hub, room_id: &str, msg: &ServerMessage) {
    if let Ok(payload) = serde_json::to_vec(msg) {
        hub.kv.publish(&hub.keys.room_channel(room_id), Bytes::from(payload)).await;
    }
}

async fn flush_cursors(hub: Arc<Hub>) {
    for room_id in hub.batcher.known_rooms().await {
        if let Some(cursors) = hub.batcher.flush_cursors(&room_id).await {
            publish(&hub, &room_id, &ServerMessage::CursorsBatch { cursors }).await;
        }
    }
}

async fn flush_reactions(hub: Arc<Hub>) {
    for room_id in hub.batcher.known_rooms().await {
        if let Some(reactions) = hub.batcher.flush_reactions(&room_id).await {
            publish(&hub, &room_id, &ServerMessage::ReactionsBatch { reactions }).await;
        }
    }
}

/// Advances every room's authoritative playback position and broadcasts
/// the result (spec §4.3 state table, "periodic tick").
async fn tick_video(hub: Arc<Hub>) {
    for room in hub.rooms.get_all_rooms().await {
        let state = hub.rooms.update_video_time(&room.id).await;
        if state.is_playing {
            publish(&hub, &room.id, &ServerMessage::VideoState { state }).await;
        }
    }
}

async fn broadcast_server_time(hub: Arc<Hub>) {
    let now = now_ms();
    for room in hub.rooms.get_all_rooms().await {
        publish(&hub, &room.id, &ServerMessage::ServerTime { now }).await;
    }
}

async fn reap_empty_rooms(hub: Arc<Hub>) {
    let before: std::collections::HashSet<_> =
        hub.rooms.get_all_rooms().await.into_iter().map(|r| r.id).collect();
    hub.rooms.cleanup_empty_rooms().await;
    let after: std::collections::HashSet<_> =
        hub.rooms.get_all_rooms().await.into_iter().map(|r| r.id).collect();
    for reaped in before.difference(&after) {
        hub.batcher.forget_room(reaped).await;
    }
}

async fn sweep_rate_limits(hub: Arc<Hub>) {
    hub.rate_limiter.sweep_local().await;
}

async fn sweep_connections(hub: Arc<Hub>) {
    hub.connection_gate.sweep().await;
}

/// Runs every flush-style driver exactly once, used on graceful shutdown to
/// drain pending batches before the process exits (spec §5).
pub async fn flush_all_once(hub: &Arc<Hub>) {
    flush_cursors(hub.clone()).await;
    flush_reactions(hub.clone()).await;
}
