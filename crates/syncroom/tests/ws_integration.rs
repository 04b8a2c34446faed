// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket integration tests using real connections against an in-process
//! axum server (spec §8 end-to-end scenarios).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use syncroom::test_support::{spawn_server, test_hub};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsRx = futures_util::stream::SplitStream<WsStream>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn ws_send(stream: &mut WsTx, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    stream.send(WsMessage::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))?;
    Ok(())
}

async fn ws_recv(stream: &mut WsRx) -> anyhow::Result<serde_json::Value> {
    let msg = tokio::time::timeout(RECV_TIMEOUT, stream.next())
        .await
        .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
        .ok_or_else(|| anyhow::anyhow!("ws stream closed"))?
        .map_err(|e| anyhow::anyhow!("ws recv: {e}"))?;
    match msg {
        WsMessage::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected Text message, got {other:?}"),
    }
}

/// Drain messages until one whose `event` field matches `event`, or time out.
async fn recv_event(stream: &mut WsRx, event: &str) -> anyhow::Result<serde_json::Value> {
    loop {
        let value = ws_recv(stream).await?;
        if value.get("event").and_then(|v| v.as_str()) == Some(event) {
            return Ok(value);
        }
    }
}

async fn ws_connect(addr: &std::net::SocketAddr, query: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let url = format!("ws://{addr}/ws?{query}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.map_err(|e| anyhow::anyhow!("ws connect: {e}"))?;
    Ok(stream.split())
}

#[tokio::test]
async fn solo_join_and_play() -> anyhow::Result<()> {
    let hub = test_hub();
    let (addr, _server) = spawn_server(hub).await?;
    let (mut tx, mut rx) = ws_connect(&addr, "timezone=Europe/Berlin&room=lobby1").await?;

    let self_msg = recv_event(&mut rx, "user:self").await?;
    assert_eq!(self_msg["user"]["city"], "Berlin");
    assert_eq!(self_msg["user"]["flag"], "🇩🇪");

    let joined = recv_event(&mut rx, "room:joined").await?;
    assert_eq!(joined["roomId"], "lobby1");
    assert_eq!(joined["videoState"]["isPlaying"], false);
    assert_eq!(joined["videoState"]["currentTime"], 0.0);
    assert_eq!(joined["videoState"]["duration"], 596.0);

    ws_send(&mut tx, &serde_json::json!({"event": "video:play"})).await?;
    let state = recv_event(&mut rx, "video:state").await?;
    assert_eq!(state["state"]["isPlaying"], true);

    Ok(())
}

#[tokio::test]
async fn two_clients_converge_on_seek_and_play() -> anyhow::Result<()> {
    let hub = test_hub();
    let (addr, _server) = spawn_server(hub).await?;

    let (mut a_tx, mut a_rx) = ws_connect(&addr, "timezone=America/New_York&room=lobby2").await?;
    recv_event(&mut a_rx, "user:self").await?;
    recv_event(&mut a_rx, "room:joined").await?;

    let (_b_tx, mut b_rx) = ws_connect(&addr, "timezone=Asia/Tokyo&room=lobby2").await?;
    recv_event(&mut b_rx, "user:self").await?;
    recv_event(&mut b_rx, "room:joined").await?;

    ws_send(&mut a_tx, &serde_json::json!({"event": "video:seek", "t": 120.0})).await?;
    recv_event(&mut a_rx, "video:state").await?;

    ws_send(&mut a_tx, &serde_json::json!({"event": "video:play"})).await?;

    let seen_by_b = recv_event(&mut b_rx, "video:state").await?;
    let position = seen_by_b["state"]["currentTime"].as_f64().expect("numeric position");
    assert!((position - 120.0).abs() < 1.0, "position={position}");
    assert_eq!(seen_by_b["state"]["isPlaying"], true);

    Ok(())
}

#[tokio::test]
async fn rate_limit_denies_excess_reactions() -> anyhow::Result<()> {
    let hub = test_hub();
    let (addr, _server) = spawn_server(hub).await?;
    let (mut tx, mut rx) = ws_connect(&addr, "room=lobby3").await?;
    recv_event(&mut rx, "user:self").await?;
    recv_event(&mut rx, "room:joined").await?;

    for _ in 0..10 {
        ws_send(&mut tx, &serde_json::json!({"event": "reaction:send", "emoji": "👍", "x": 1.0, "y": 1.0, "videoTime": 0.0})).await?;
    }

    let mut denials = 0;
    for _ in 0..10 {
        if let Ok(value) = tokio::time::timeout(Duration::from_millis(500), ws_recv(&mut rx)).await {
            if value?.get("event").and_then(|v| v.as_str()) == Some("error:ratelimit") {
                denials += 1;
            }
        }
    }
    assert!(denials >= 5, "expected at least 5 rate-limit denials, got {denials}");

    Ok(())
}

#[tokio::test]
async fn time_sync_response_orders_timestamps() -> anyhow::Result<()> {
    let hub = test_hub();
    let (addr, _server) = spawn_server(hub).await?;
    let body = serde_json::json!({"clientSendTime": 1000});
    let response = reqwest_free_post(&addr, &body).await?;
    assert!(response["serverReceiveTime"].as_u64().unwrap_or(0) <= response["serverSendTime"].as_u64().unwrap_or(0));
    Ok(())
}

/// Minimal hand-rolled HTTP POST, avoiding an extra dependency just for one
/// integration test.
async fn reqwest_free_post(addr: &std::net::SocketAddr, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let payload = serde_json::to_vec(body)?;
    let mut stream = tokio::net::TcpStream::connect(addr).await?;
    let request = format!(
        "POST /time HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    );
    stream.write_all(request.as_bytes()).await?;
    stream.write_all(&payload).await?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let text = String::from_utf8_lossy(&raw);
    let body_start = text.find("\r\n\r\n").map(|i| i + 4).unwrap_or(0);
    Ok(serde_json::from_str(&text[body_start..])?)
}
