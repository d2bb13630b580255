// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the relay.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::RelayState;

/// Build the axum `Router` with all relay routes.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/devices", get(http::devices))
        // Key rotation
        .route("/api/v1/rotation", get(http::rotation_status))
        .route("/api/v1/rotation/run", post(http::rotation_run))
        // WebSocket (breaker commands and telemetry)
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
