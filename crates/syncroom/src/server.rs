// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket router assembly and the top-level run loop: binds the
//! listener, spawns the periodic drivers, and drives graceful two-stage
//! shutdown on SIGTERM/SIGINT (spec §5, §6, §7).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::drivers;
use crate::hub::{ws::ws_handler, Hub};
use crate::kv::memory::MemoryStore;
use crate::kv::nats::NatsStore;
use crate::kv::KvPort;
use crate::time;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: u64,
    uptime_seconds: u64,
    version: &'static str,
}

async fn health(State(hub): State<Arc<Hub>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if hub.kv.connected() { "healthy" } else { "degraded" },
        timestamp: crate::room::now_ms(),
        uptime_seconds: hub.uptime_secs(),
        version: VERSION,
    })
}

/// Builds the full router: WebSocket upgrade, health, and time-exchange
/// routes (spec §6 "HTTP surface").
pub fn build_router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/time", get(time::handle).post(time::handle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

/// Connects the configured KV/pub-sub backend: clustered NATS when
/// `--nats-url` is set, the in-process fallback otherwise (spec §4.1).
async fn connect_kv(config: &Config) -> KvPort {
    match &config.nats_url {
        Some(url) => match NatsStore::connect(url).await {
            Ok(store) => {
                info!(%url, "connected to NATS");
                KvPort::Nats(store)
            }
            Err(err) => {
                tracing::warn!(%url, error = %err, "NATS connection failed, falling back to standalone mode");
                KvPort::Memory(MemoryStore::new())
            }
        },
        None => {
            info!("no NATS URL configured, running in standalone mode");
            KvPort::Memory(MemoryStore::new())
        }
    }
}

/// Runs the hub to completion: binds the listener, starts periodic
/// drivers, serves until a shutdown signal fires, then flushes and exits.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let kv = connect_kv(&config).await;
    let instance_id = config.instance_id();
    let hub = Hub::new(kv, &config.prefix, instance_id.clone());
    hub.rooms.ensure_default_room().await;

    let shutdown = CancellationToken::new();
    drivers::spawn_all(hub.clone(), shutdown.clone());
    spawn_signal_handler(shutdown.clone());

    let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, instance_id = %instance_id, "syncroom listening");

    let router = build_router(hub.clone()).into_make_service_with_connect_info::<SocketAddr>();
    let sd = shutdown.clone();
    axum::serve(listener, router).with_graceful_shutdown(async move { sd.cancelled().await }).await?;

    info!("server stopped accepting connections, flushing pending batches");
    drivers::flush_all_once(&hub).await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGTERM"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGINT"),
        }
        shutdown.cancel();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGTERM again, forcing exit"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGINT again, forcing exit"),
        }
        std::process::exit(130);
    });
}

