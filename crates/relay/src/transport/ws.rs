// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket relay for breaker commands and telemetry.
//!
//! Each client message is handled on its own and answered with exactly one
//! event. A rate-limited breaker command is answered with `breaker:retry`
//! carrying the original command so the client can resend it.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use emcb::{ApiError, BreakerCommand, Device, HandlePosition};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::state::RelayState;
use crate::transport::auth;

/// Query parameters for the WS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Messages from relay clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "breaker:open")]
    BreakerOpen {
        device_id: String,
        #[serde(default)]
        reason: String,
    },
    #[serde(rename = "breaker:close")]
    BreakerClose {
        device_id: String,
        #[serde(default)]
        reason: String,
    },
    #[serde(rename = "handle:get")]
    HandleGet { device_id: String },
    #[serde(rename = "waveform:get")]
    WaveformGet { device_id: String },
    /// Ask for the device list; `version` is the one the client already has.
    #[serde(rename = "devices:update")]
    DevicesUpdate {
        #[serde(default)]
        version: Option<u64>,
    },
}

/// Messages to relay clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "breaker:opened")]
    BreakerOpened { device_id: String },
    #[serde(rename = "breaker:closed")]
    BreakerClosed { device_id: String },
    #[serde(rename = "breaker:retry")]
    BreakerRetry { device_id: String, command: BreakerCommand, reason: String },
    #[serde(rename = "handle")]
    Handle { device_id: String, position: HandlePosition },
    #[serde(rename = "waveform")]
    Waveform { device_id: String, waveform: serde_json::Value },
    #[serde(rename = "devices")]
    Devices { version: u64, devices: Vec<Device> },
    #[serde(rename = "devices:unchanged")]
    DevicesUnchanged { version: u64 },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    fn error(err: &ApiError) -> Self {
        Self::Error { message: err.to_string() }
    }
}

/// `GET /ws`: WebSocket upgrade for relay clients.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if auth::validate_ws_token(query.token.as_deref(), state.config.auth_token.as_deref()).is_err() {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_ws(socket, state)).into_response()
}

/// Per-connection WebSocket handler.
async fn handle_ws(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    tracing::debug!("relay client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => continue,
                };
                let reply = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => dispatch(&state, event).await,
                    Err(e) => ServerEvent::Error { message: format!("invalid message: {e}") },
                };
                let Ok(json) = serde_json::to_string(&reply) else {
                    continue;
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("relay client disconnected");
}

/// Execute one client request against the vendor API.
pub async fn dispatch(state: &RelayState, event: ClientEvent) -> ServerEvent {
    match event {
        ClientEvent::BreakerOpen { device_id, reason } => {
            breaker(state, device_id, BreakerCommand::Open, reason).await
        }
        ClientEvent::BreakerClose { device_id, reason } => {
            breaker(state, device_id, BreakerCommand::Close, reason).await
        }
        ClientEvent::HandleGet { device_id } => {
            match state.breakers.handle_position(&state.scope, &device_id).await {
                Ok(position) => ServerEvent::Handle { device_id, position },
                Err(e) => ServerEvent::error(&e),
            }
        }
        ClientEvent::WaveformGet { device_id } => {
            match state.breakers.capture_waveform(&state.scope, &device_id).await {
                Ok(waveform) => ServerEvent::Waveform { device_id, waveform },
                Err(e) => ServerEvent::error(&e),
            }
        }
        ClientEvent::DevicesUpdate { version } => match state.refresh_devices().await {
            Ok(snapshot) if version == Some(snapshot.version) => {
                ServerEvent::DevicesUnchanged { version: snapshot.version }
            }
            Ok(snapshot) => {
                ServerEvent::Devices { version: snapshot.version, devices: snapshot.devices }
            }
            Err(e) => ServerEvent::error(&e),
        },
    }
}

async fn breaker(
    state: &RelayState,
    device_id: String,
    command: BreakerCommand,
    reason: String,
) -> ServerEvent {
    match state.breakers.set_breaker(&state.scope, &device_id, command, &reason).await {
        Ok(()) => match command {
            BreakerCommand::Open => ServerEvent::BreakerOpened { device_id },
            BreakerCommand::Close => ServerEvent::BreakerClosed { device_id },
        },
        Err(ApiError::RateLimited) => {
            tracing::debug!(%device_id, command = command.as_str(), "breaker command rate limited");
            ServerEvent::BreakerRetry { device_id, command, reason }
        }
        Err(e) => {
            tracing::warn!(%device_id, command = command.as_str(), err = %e, "breaker command failed");
            ServerEvent::error(&e)
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
