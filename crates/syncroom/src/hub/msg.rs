// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed WebSocket message sum (spec §9 DESIGN NOTES — replaces
//! string-event dispatch): one variant per inbound/outbound event, payload
//! shapes matching §3 and §4.5.

use serde::{Deserialize, Serialize};

use crate::model::{Cursor, Reaction, Room, User, VideoState};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    #[serde(rename = "room:join")]
    RoomJoin { room_id: String },
    #[serde(rename = "room:leave")]
    RoomLeave {},
    #[serde(rename = "rooms:list")]
    RoomsList {},
    #[serde(rename = "time:sync")]
    TimeSync { client_ts: u64 },
    #[serde(rename = "video:play")]
    VideoPlay {},
    #[serde(rename = "video:pause")]
    VideoPause {},
    #[serde(rename = "video:seek")]
    VideoSeek { t: f64 },
    #[serde(rename = "cursor:move")]
    CursorMove { x: f64, y: f64 },
    #[serde(rename = "reaction:send")]
    ReactionSend { emoji: String, x: f64, y: f64, video_time: f64 },
    #[serde(rename = "heartbeat")]
    Heartbeat {},
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "user:self")]
    UserSelf { user: User },
    #[serde(rename = "room:joined")]
    RoomJoined { room_id: String, room: Room, video_state: VideoState, users: Vec<User> },
    #[serde(rename = "user:joined")]
    UserJoined { user: User },
    #[serde(rename = "user:left")]
    UserLeft { user_id: String },
    #[serde(rename = "users:list")]
    UsersList { users: Vec<User> },
    #[serde(rename = "rooms:list:response")]
    RoomsListResponse { rooms: Vec<crate::model::RoomSummary> },
    #[serde(rename = "time:sync:response")]
    TimeSyncResponse { client_timestamp: u64, server_receive_time: u64, server_send_time: u64 },
    #[serde(rename = "video:state")]
    VideoState { state: VideoState },
    #[serde(rename = "cursors:batch")]
    CursorsBatch { cursors: Vec<Cursor> },
    #[serde(rename = "reactions:batch")]
    ReactionsBatch { reactions: Vec<Reaction> },
    #[serde(rename = "server:time")]
    ServerTime { now: u64 },
    #[serde(rename = "error:ratelimit")]
    ErrorRateLimit { action: String, code: String, retry_in: u64, message: String },
}
