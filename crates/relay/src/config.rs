// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use emcb::api::DEFAULT_BASE_URL;
use emcb::RotationConfig;

/// Configuration for the relay and the rotation engine it hosts.
#[derive(Debug, Clone, clap::Args)]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "EMCB_RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "EMCB_RELAY_PORT")]
    pub port: u16,

    /// Bearer token for relay clients. If unset, auth is disabled.
    #[arg(long, env = "EMCB_RELAY_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Vendor API root.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "EMCB_API_BASE_URL")]
    pub base_url: String,

    /// Application credential file (`api_key`, `client_id`, `client_secret1`).
    #[arg(long, env = "EMCB_APP_CREDENTIALS")]
    pub app_credentials: PathBuf,

    /// Organization credential file as returned when the organization was created.
    #[arg(long, env = "EMCB_ORG_CREDENTIALS")]
    pub org_credentials: PathBuf,

    /// Timeout for every vendor API request, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "EMCB_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Cached tokens closer than this to expiry are re-issued, in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "EMCB_TOKEN_MARGIN_MS")]
    pub token_margin_ms: u64,

    /// Keys with less than this lifetime left are rotated, in seconds.
    #[arg(long, default_value_t = 2 * 24 * 60 * 60, env = "EMCB_KEY_EXPIRING_THRESHOLD_SECS")]
    pub key_expiring_threshold_secs: u64,

    /// Wait between rotation passes, in seconds.
    #[arg(long, default_value_t = 24 * 60 * 60, env = "EMCB_RECHECK_INTERVAL_SECS")]
    pub recheck_interval_secs: u64,

    /// Wait after acting before the resulting keys are listed, in milliseconds.
    #[arg(long, default_value_t = 20_000, env = "EMCB_SETTLE_DELAY_MS")]
    pub settle_delay_ms: u64,

    /// Serve the relay without running UDP key rotation.
    #[arg(long, env = "EMCB_NO_ROTATION")]
    pub no_rotation: bool,
}

impl RelayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn token_margin(&self) -> Duration {
        Duration::from_millis(self.token_margin_ms)
    }

    pub fn rotation(&self) -> RotationConfig {
        RotationConfig {
            expiring_threshold: Duration::from_secs(self.key_expiring_threshold_secs),
            recheck_interval: Duration::from_secs(self.recheck_interval_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}
