// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use syncroom::config::Config;

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(err) = config.validate() {
        eprintln!("error: {err}");
        std::process::exit(2);
    }

    init_tracing(&config);

    if let Err(err) = syncroom::server::run(config).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}
