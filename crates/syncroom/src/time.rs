// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time exchange endpoint (spec §4.6): a single stateless request/response
//! measuring server-side receive and send timestamps. No state, no rate
//! limiting, safe to serve from any instance.

use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::room::now_ms;

/// A handling time above this is unusual enough to be worth a debug-level
/// log line (not an error — the endpoint has no retry or alerting path).
const SLOW_PROCESSING_THRESHOLD_MS: u64 = 50;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncRequest {
    pub client_send_time: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_send_time: Option<u64>,
    pub server_receive_time: u64,
    pub server_send_time: u64,
    pub server_processing_time: u64,
}

pub async fn handle(body: Option<Json<TimeSyncRequest>>) -> Json<TimeSyncResponse> {
    let server_receive_time = now_ms();
    let client_send_time = body.and_then(|Json(r)| r.client_send_time);
    let server_send_time = now_ms();
    let server_processing_time = server_send_time.saturating_sub(server_receive_time);
    if server_processing_time > SLOW_PROCESSING_THRESHOLD_MS {
        debug!(server_processing_time, "slow time-exchange handling");
    }
    Json(TimeSyncResponse { client_send_time, server_receive_time, server_send_time, server_processing_time })
}
