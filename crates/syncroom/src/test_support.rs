// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure for in-process integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::hub::Hub;
use crate::kv::memory::MemoryStore;
use crate::kv::KvPort;

/// Builds a [`Hub`] backed by the in-process KV fallback, with the default
/// room already created, suitable for integration tests that don't need a
/// live NATS server.
pub fn test_hub() -> Arc<Hub> {
    Hub::new(KvPort::Memory(MemoryStore::new()), "synctest", "instance-test".to_owned())
}

/// Binds an ephemeral port, serves `hub`'s router on it, and returns the
/// bound address plus a join handle for the server task.
pub async fn spawn_server(hub: Arc<Hub>) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    hub.rooms.ensure_default_room().await;
    let router =
        crate::server::build_router(hub).into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}
