// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use emcb_relay::config::RelayConfig;

/// Realtime relay and UDP key rotation for EMCB breakers.
#[derive(Debug, Parser)]
#[command(name = "emcb-relay", version)]
struct Cli {
    #[command(flatten)]
    config: RelayConfig,

    /// Emit logs as JSON.
    #[arg(long, env = "EMCB_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = emcb_relay::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
