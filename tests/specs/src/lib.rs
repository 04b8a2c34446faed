// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests (spec §8).
//!
//! Spawns the real `syncroom` binary as a subprocess and exercises it over
//! its actual wire protocol: WebSocket for the hub, plain HTTP for `/health`
//! and `/time`. This is the thing a deployed instance actually looks like,
//! as opposed to the in-process `axum::serve` tests in the `syncroom` crate
//! itself.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Resolve the path to the compiled `syncroom` binary.
pub fn syncroom_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("syncroom")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `syncroom` process, killed on drop.
pub struct SyncroomProcess {
    child: Child,
    port: u16,
}

/// Builder for configuring a [`SyncroomProcess`] before spawning it.
pub struct SyncroomBuilder {
    nats_url: Option<String>,
    instance_id: Option<String>,
}

impl Default for SyncroomBuilder {
    fn default() -> Self {
        Self { nats_url: None, instance_id: None }
    }
}

impl SyncroomBuilder {
    /// Point the instance at a clustered NATS backend instead of the
    /// standalone in-process fallback.
    pub fn nats(mut self, url: &str) -> Self {
        self.nats_url = Some(url.to_owned());
        self
    }

    pub fn instance_id(mut self, id: &str) -> Self {
        self.instance_id = Some(id.to_owned());
        self
    }

    pub fn spawn(self) -> anyhow::Result<SyncroomProcess> {
        let binary = syncroom_binary();
        anyhow::ensure!(binary.exists(), "syncroom binary not found at {}", binary.display());

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--port".into(),
            port.to_string(),
            "--hostname".into(),
            "127.0.0.1".into(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        if let Some(url) = self.nats_url {
            args.extend(["--nats-url".into(), url]);
        }
        if let Some(id) = self.instance_id {
            args.extend(["--instance-id".into(), id]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(SyncroomProcess { child, port })
    }
}

impl SyncroomProcess {
    pub fn build() -> SyncroomBuilder {
        SyncroomBuilder::default()
    }

    /// Spawn a standalone instance with default settings.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("ws://127.0.0.1:{}/ws", self.port)
        } else {
            format!("ws://127.0.0.1:{}/ws?{query}", self.port)
        }
    }

    /// Poll `/health` until it responds, for up to `timeout`.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("syncroom did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("syncroom did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for SyncroomProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
pub type WsTx = futures_util::stream::SplitSink<WsStream, WsMessage>;
pub type WsRx = futures_util::stream::SplitStream<WsStream>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn ws_connect(url: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| anyhow::anyhow!("ws connect: {e}"))?;
    Ok(stream.split())
}

pub async fn ws_send(stream: &mut WsTx, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    stream.send(WsMessage::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))?;
    Ok(())
}

pub async fn ws_recv(stream: &mut WsRx) -> anyhow::Result<serde_json::Value> {
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
pub async fn recv_event(stream: &mut WsRx, event: &str) -> anyhow::Result<serde_json::Value> {
    loop {
        let value = ws_recv(stream).await?;
        if value.get("event").and_then(|v| v.as_str()) == Some(event) {
            return Ok(value);
        }
    }
}
