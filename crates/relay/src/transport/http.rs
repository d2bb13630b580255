// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use emcb::keys::executor::PassReport;
use emcb::keys::planner::RotationAction;
use emcb::keys::scheduler::PassSummary;
use emcb::{Device, DeviceFilter, RotationError, RotationPhase};
use serde::Serialize;

use crate::error::{api_response, RelayError};
use crate::state::RelayState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub scope: String,
    pub rotation: bool,
}

/// Result of a filtered device lookup. Not versioned.
#[derive(Debug, Serialize)]
pub struct DeviceMatches {
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
pub struct RotationStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<RotationPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassView>,
}

/// JSON view of one rotation pass.
#[derive(Debug, Serialize)]
pub struct PassView {
    pub finished_at: DateTime<Utc>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<OutcomeView>,
}

#[derive(Debug, Serialize)]
pub struct OutcomeView {
    #[serde(flatten)]
    pub action: RotationAction,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PassView {
    pub fn new(finished_at: DateTime<Utc>, result: &Result<PassReport, RotationError>) -> Self {
        match result {
            Ok(report) => Self {
                finished_at,
                ok: true,
                error: None,
                planned: report.planned,
                succeeded: report.succeeded,
                failed: report.failed,
                outcomes: report
                    .outcomes
                    .iter()
                    .map(|o| OutcomeView {
                        action: o.action.clone(),
                        ok: o.is_success(),
                        created_key_id: o.result.as_ref().ok().cloned().flatten(),
                        error: o.result.as_ref().err().map(ToString::to_string),
                    })
                    .collect(),
            },
            Err(e) => Self {
                finished_at,
                ok: false,
                error: Some(e.to_string()),
                planned: 0,
                succeeded: 0,
                failed: 0,
                outcomes: Vec::new(),
            },
        }
    }
}

impl From<&PassSummary> for PassView {
    fn from(summary: &PassSummary) -> Self {
        Self::new(summary.finished_at, &summary.result)
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        scope: s.scope.to_string(),
        rotation: s.scheduler.is_some(),
    })
}

/// `GET /api/v1/devices`: re-fetch and return the versioned device list.
///
/// With `serialNumber`, `locationId` or `ancestorLocationId` query parameters
/// the matching devices are returned instead.
pub async fn devices(
    State(s): State<Arc<RelayState>>,
    Query(filter): Query<DeviceFilter>,
) -> impl IntoResponse {
    if !filter.is_empty() {
        return match s.keys.find_devices(&s.scope, &filter).await {
            Ok(devices) => Json(DeviceMatches { devices }).into_response(),
            Err(e) => {
                tracing::warn!(err = %e, "device lookup failed");
                api_response(&e).into_response()
            }
        };
    }
    match s.refresh_devices().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            tracing::warn!(err = %e, "device list fetch failed");
            api_response(&e).into_response()
        }
    }
}

/// `GET /api/v1/rotation`
pub async fn rotation_status(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    let Some(ref scheduler) = s.scheduler else {
        return Json(RotationStatus { enabled: false, phase: None, last_pass: None });
    };
    let phase = *scheduler.phase().borrow();
    let last_pass = scheduler.last_pass().borrow().as_ref().map(PassView::from);
    Json(RotationStatus { enabled: true, phase: Some(phase), last_pass })
}

/// `POST /api/v1/rotation/run`: run one pass now and return its result.
pub async fn rotation_run(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    let Some(ref scheduler) = s.scheduler else {
        return RelayError::BadRequest.to_http_response("rotation is disabled").into_response();
    };
    let result = scheduler.run_pass().await;
    Json(PassView::new(Utc::now(), &result)).into_response()
}
