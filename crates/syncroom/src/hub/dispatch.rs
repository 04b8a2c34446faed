// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound message dispatch (spec §4.5 table): rate-limits, mutates room
//! state or enqueues into batchers, and produces outbound broadcasts via
//! the pub/sub port. Direct (single-session) replies bypass pub/sub;
//! broadcasts are published to the room channel and reach every session
//! joined to that room across the cluster, including the sender.

use bytes::Bytes;

use super::msg::{ClientMessage, ServerMessage};
use super::session::Session;
use super::Hub;
use crate::error::ErrorCode;
use crate::model::{clamp_percent, Cursor, Reaction};
use crate::ratelimit::Action;
use crate::room::now_ms;

/// Joins `room_id`, creating it on first join if absent, leaving any
/// current room first (spec §4.5 `JOINED → JOINED`). Returns the direct
/// `room:joined` reply and broadcasts `user:joined` / `users:list`.
pub async fn join_room(hub: &Hub, session: &mut Session, room_id: &str) -> ServerMessage {
    if session.current_room.is_some() {
        leave_room(hub, session).await;
    }

    let room = hub.rooms.create_room(room_id, &session.user.id, Default::default()).await;
    hub.rooms.add_user_to_room(room_id, &session.user).await;
    session.join(room_id);

    let video_state = hub.rooms.get_video_state(room_id).await;
    let users: Vec<_> = hub.rooms.get_room_users(room_id).await.into_values().collect();

    broadcast(hub, room_id, &ServerMessage::UserJoined { user: session.user.clone() }).await;
    broadcast(hub, room_id, &ServerMessage::UsersList { users: users.clone() }).await;

    ServerMessage::RoomJoined { room_id: room_id.to_owned(), room, video_state, users }
}

/// Leaves the session's current room if any, removing membership and
/// cursor and broadcasting `user:left` / `users:list` (spec §4.5).
pub async fn leave_room(hub: &Hub, session: &mut Session) {
    let Some(room_id) = session.leave() else { return };
    hub.rooms.remove_user_from_room(&room_id, &session.user.id).await;

    let users: Vec<_> = hub.rooms.get_room_users(&room_id).await.into_values().collect();
    broadcast(hub, &room_id, &ServerMessage::UserLeft { user_id: session.user.id.clone() }).await;
    broadcast(hub, &room_id, &ServerMessage::UsersList { users }).await;
}

/// Publishes `msg` to every session subscribed to `room_id`'s channel,
/// including the publisher (spec §4.5 "Outbound broadcast").
async fn broadcast(hub: &Hub, room_id: &str, msg: &ServerMessage) {
    let Ok(payload) = serde_json::to_vec(msg) else { return };
    hub.kv.publish(&hub.keys.room_channel(room_id), Bytes::from(payload)).await;
}

/// Dispatch one inbound message. Returns a direct reply for the
/// originating session only, if any; broadcasts (when applicable) are
/// published as a side effect.
pub async fn handle(hub: &Hub, session: &mut Session, msg: ClientMessage) -> Option<ServerMessage> {
    if let Some(action) = rate_limited_action(&msg) {
        if let Err(denial) = hub.rate_limiter.check(action, &session.user.id).await {
            return Some(deny(denial));
        }
        // Burst-smoothing layer: drains one token per admitted call on top
        // of the fixed-window cap (spec §4.2).
        if let Err(denial) = hub.token_buckets.check(action, &session.user.id).await {
            return Some(deny(denial));
        }
    }

    match msg {
        ClientMessage::RoomJoin { room_id } => Some(join_room(hub, session, &room_id).await),
        ClientMessage::RoomLeave {} => {
            leave_room(hub, session).await;
            None
        }
        ClientMessage::RoomsList {} => {
            let rooms = hub.rooms.list_room_summaries().await;
            Some(ServerMessage::RoomsListResponse { rooms })
        }
        ClientMessage::TimeSync { client_ts } => {
            let server_receive_time = now_ms();
            let server_send_time = now_ms();
            Some(ServerMessage::TimeSyncResponse {
                client_timestamp: client_ts,
                server_receive_time,
                server_send_time,
            })
        }
        ClientMessage::VideoPlay {} => {
            let Some(room_id) = session.current_room.clone() else { return None };
            let state = hub.rooms.set_video_state(&room_id, |s| {
                let now = now_ms();
                s.current_time = s.expected_position(now);
                s.is_playing = true;
                s.last_update_time = now;
            }).await;
            broadcast(hub, &room_id, &ServerMessage::VideoState { state }).await;
            None
        }
        ClientMessage::VideoPause {} => {
            let Some(room_id) = session.current_room.clone() else { return None };
            let state = hub.rooms.set_video_state(&room_id, |s| {
                let now = now_ms();
                s.current_time = s.expected_position(now);
                s.is_playing = false;
                s.last_update_time = now;
            }).await;
            broadcast(hub, &room_id, &ServerMessage::VideoState { state }).await;
            None
        }
        ClientMessage::VideoSeek { t } => {
            let Some(room_id) = session.current_room.clone() else { return None };
            let state = hub.rooms.set_video_state(&room_id, |s| {
                s.current_time = t.clamp(0.0, s.duration);
                s.last_update_time = now_ms();
            }).await;
            broadcast(hub, &room_id, &ServerMessage::VideoState { state }).await;
            None
        }
        ClientMessage::CursorMove { x, y } => {
            let Some(room_id) = session.current_room.clone() else { return None };
            let cursor = Cursor {
                user_id: session.user.id.clone(),
                city: session.user.city.clone(),
                flag: session.user.flag.clone(),
                x: clamp_percent(x),
                y: clamp_percent(y),
                timestamp: now_ms(),
            };
            hub.rooms.update_cursor(&room_id, &session.user.id, cursor.clone()).await;
            hub.batcher.push_cursor(&room_id, cursor).await;
            None
        }
        ClientMessage::ReactionSend { emoji, x, y, video_time } => {
            let Some(room_id) = session.current_room.clone() else { return None };
            let reaction = Reaction {
                id: hub.next_reaction_id(),
                user_id: session.user.id.clone(),
                city: session.user.city.clone(),
                flag: session.user.flag.clone(),
                emoji,
                x: clamp_percent(x),
                y: clamp_percent(y),
                video_time,
                timestamp: now_ms(),
            };
            hub.batcher.push_reaction(&room_id, reaction).await;
            None
        }
        ClientMessage::Heartbeat {} => {
            session.user.last_seen = now_ms();
            if let Some(room_id) = session.current_room.clone() {
                hub.rooms.add_user_to_room(&room_id, &session.user).await;
            }
            None
        }
    }
}

fn deny(denial: crate::ratelimit::Denial) -> ServerMessage {
    ServerMessage::ErrorRateLimit {
        action: denial.action.to_owned(),
        code: ErrorCode::RateLimited.as_str().to_owned(),
        retry_in: denial.retry_in.as_millis() as u64,
        message: format!("rate limit exceeded for {}", denial.action),
    }
}

fn rate_limited_action(msg: &ClientMessage) -> Option<Action> {
    match msg {
        ClientMessage::RoomJoin { .. } => Some(Action::RoomJoin),
        ClientMessage::TimeSync { .. } => Some(Action::Sync),
        ClientMessage::VideoPlay {} | ClientMessage::VideoPause {} | ClientMessage::VideoSeek { .. } => {
            Some(Action::VideoControl)
        }
        ClientMessage::CursorMove { .. } => Some(Action::Cursor),
        ClientMessage::ReactionSend { .. } => Some(Action::Reaction),
        ClientMessage::RoomLeave {} | ClientMessage::RoomsList {} | ClientMessage::Heartbeat {} => None,
    }
}
