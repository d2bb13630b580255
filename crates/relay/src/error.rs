// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use emcb::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the relay API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayError {
    Unauthorized,
    BadRequest,
    NotFound,
    RateLimited,
    UpstreamError,
    Internal,
}

impl RelayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::RateLimited => 429,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    /// Classify a vendor API failure.
    pub fn from_api(err: &ApiError) -> Self {
        match err {
            ApiError::RateLimited => Self::RateLimited,
            ApiError::Status { status: 404, .. } => Self::NotFound,
            ApiError::Auth(_) | ApiError::Status { .. } | ApiError::Transport(_) => {
                Self::UpstreamError
            }
            ApiError::Decode(_) => Self::Internal,
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Map an API failure straight to an HTTP error response.
pub fn api_response(err: &ApiError) -> (StatusCode, Json<ErrorResponse>) {
    RelayError::from_api(err).to_http_response(err.to_string())
}
