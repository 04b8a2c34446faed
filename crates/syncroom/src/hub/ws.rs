// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade handler and per-connection event loop (spec §4.5).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::dispatch;
use super::msg::{ClientMessage, ServerMessage};
use super::session::Session;
use super::Hub;
use crate::error::ErrorCode;
use crate::model::{User, MAIN_LOBBY_ID};
use crate::room::now_ms;
use crate::timezone;

/// How often the hub pings an idle connection, and how long it tolerates
/// silence before reaping it (spec §5 resource bounds).
const PING_INTERVAL: Duration = Duration::from_secs(25);
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_room")]
    pub room: String,
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_room() -> String {
    MAIN_LOBBY_ID.to_owned()
}

fn next_user_suffix() -> String {
    let n: u32 = rand::random();
    format!("{:07x}", n % 0x1000_0000)
}

pub async fn ws_handler(
    State(hub): State<Arc<Hub>>,
    Query(query): Query<ConnectQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !hub.connection_gate.admit(addr.ip()).await {
        warn!(ip = %addr.ip(), "connection admission denied");
        let status = axum::http::StatusCode::from_u16(ErrorCode::RateLimited.http_status())
            .unwrap_or(axum::http::StatusCode::TOO_MANY_REQUESTS);
        return status.into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(hub, socket, query))
}

async fn handle_connection(hub: Arc<Hub>, socket: WebSocket, query: ConnectQuery) {
    let (city, flag) = timezone::resolve(&query.timezone);
    let now = now_ms();
    let user = User {
        id: format!("user_{}", next_user_suffix()),
        city,
        timezone: query.timezone,
        flag,
        connected_at: now,
        last_seen: now,
        instance: hub.instance_id.clone(),
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut session = Session::new(user.clone());

    if send_json(&mut ws_tx, &ServerMessage::UserSelf { user }).await.is_err() {
        return;
    }

    // Subscribe before joining so the session's own `user:joined`/`users:list`
    // broadcasts land in this channel rather than being published to a room
    // nobody is listening on yet.
    let mut room_rx: crate::kv::Subscription = hub.kv.subscribe(&hub.keys.room_channel(&query.room));
    let mut subscribed_room = query.room.clone();

    let joined = dispatch::join_room(&hub, &mut session, &query.room).await;
    if send_json(&mut ws_tx, &joined).await.is_err() {
        dispatch::leave_room(&hub, &mut session).await;
        return;
    }

    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
    let mut last_activity = tokio::time::Instant::now();

    loop {
        tokio::select! {
            broadcasted = room_rx.recv() => {
                match broadcasted {
                    Ok(payload) => {
                        if ws_tx.send(Message::Text(String::from_utf8_lossy(&payload).into_owned().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_ticker.tick() => {
                if last_activity.elapsed() > PONG_TIMEOUT {
                    info!(user_id = %session.user.id, "reaping idle session");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                let incoming = match incoming {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match incoming {
                    Message::Text(text) => {
                        last_activity = tokio::time::Instant::now();
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(reply) = dispatch::handle(&hub, &mut session, client_msg).await {
                                    if send_json(&mut ws_tx, &reply).await.is_err() {
                                        break;
                                    }
                                }
                                // A `room:join` may have changed which room this
                                // session belongs to; rebind the broadcast
                                // subscription so it keeps tracking the current room.
                                if let Some(room_id) = session.current_room.as_deref() {
                                    if room_id != subscribed_room {
                                        room_rx = hub.kv.subscribe(&hub.keys.room_channel(room_id));
                                        subscribed_room = room_id.to_owned();
                                    }
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "dropping unparseable inbound message");
                            }
                        }
                    }
                    Message::Pong(_) => {
                        last_activity = tokio::time::Instant::now();
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    dispatch::leave_room(&hub, &mut session).await;
    session.close();
}

async fn send_json<S>(tx: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
