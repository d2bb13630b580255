// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::RelayError;
use crate::state::RelayState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), RelayError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(RelayError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

/// Validate the `?token=` value of a WebSocket upgrade.
pub fn validate_ws_token(token: Option<&str>, expected: Option<&str>) -> Result<(), RelayError> {
    match (expected, token) {
        (None, _) => Ok(()),
        (Some(expected), Some(token)) if constant_time_eq(token, expected) => Ok(()),
        _ => Err(RelayError::Unauthorized),
    }
}

/// Axum middleware enforcing Bearer auth on HTTP routes.
///
/// Exempt: `/api/v1/health` and `/ws`, which checks its query token itself.
pub async fn auth_layer(
    state: State<Arc<RelayState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/api/v1/health" || path == "/ws" {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        let body = crate::error::ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            axum::Json(body),
        )
            .into_response();
    }

    next.run(req).await
}
