// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Realtime synchronization hub for watch-party style shared playback.
#[derive(Debug, Parser, Clone)]
#[command(name = "syncroom", version, about)]
pub struct Config {
    /// HTTP/WebSocket listen port.
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Listen address.
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// NATS URL for the clustered KV/pub-sub port. When unset, the hub runs
    /// in standalone (single-instance) mode using the in-process fallback.
    #[arg(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// Tag appended to log lines and user records; defaults to
    /// `instance-{pid}`.
    #[arg(long, env = "INSTANCE_ID")]
    pub instance_id: Option<String>,

    /// Subject/key prefix used for all KV and pub/sub names.
    #[arg(long, env = "SYNCROOM_PREFIX", default_value = "syncroom")]
    pub prefix: String,

    /// Log format (json or text).
    #[arg(long, env = "SYNCROOM_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SYNCROOM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing. Fatal startup errors
    /// (spec §7) surface through this before any listener binds.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("--port must be nonzero");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be 'json' or 'text'");
        }
        Ok(())
    }

    /// Resolve the effective instance id, defaulting to `instance-{pid}`.
    pub fn instance_id(&self) -> String {
        self.instance_id.clone().unwrap_or_else(|| format!("instance-{}", std::process::id()))
    }
}
