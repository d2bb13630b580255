// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{TimeDelta, Utc};
use serde_json::json;
use tokio::net::TcpListener;

use super::*;
use crate::api::TokenIssuer;
use crate::auth::ScopeCredentials;
use crate::auth::DEFAULT_SAFETY_MARGIN;
use crate::error::AuthError;

/// Recorded upstream traffic.
#[derive(Default)]
struct Upstream {
    token_calls: AtomicU32,
    requests: Mutex<Vec<String>>,
    bodies: Mutex<Vec<serde_json::Value>>,
}

impl Upstream {
    fn record(&self, line: String, body: Option<serde_json::Value>) {
        if let Ok(mut r) = self.requests.lock() {
            r.push(line);
        }
        if let (Some(body), Ok(mut b)) = (body, self.bodies.lock()) {
            b.push(body);
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn bodies(&self) -> Vec<serde_json::Value> {
        self.bodies.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
    let sub = headers.get("em-api-subscription-key").and_then(|v| v.to_str().ok());
    bearer == Some("Bearer bearer-1") && sub == Some("sub-key")
}

fn unauthorized() -> axum::response::Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "Unauthorized"}}))).into_response()
}

async fn issue_token(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    up.token_calls.fetch_add(1, Ordering::SeqCst);
    let sub = headers.get("em-api-subscription-key").and_then(|v| v.to_str().ok());
    if sub != Some("sub-key") || body["clientSecret"] != "secret" {
        return (StatusCode::FORBIDDEN, Json(json!({"error": {"message": "invalid client"}})))
            .into_response();
    }
    let expires_at = (Utc::now() + TimeDelta::hours(1)).to_rfc3339();
    Json(json!({"data": {"token": "bearer-1", "expiresAt": expires_at}})).into_response()
}

async fn list_devices(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let devices = vec![
        json!({"id": "dev-1", "serialNumber": "30000e1c248a3f18", "hardwareType": "emcb", "sku": "SUHJ8301"}),
        json!({"id": "dev-2", "locationId": "loc-9"}),
    ];
    let Some(filter) = query.get("$filter") else {
        up.record("GET /devices".into(), None);
        return Json(json!({"data": devices})).into_response();
    };
    up.record(format!("GET /devices $filter={filter}"), None);
    let matching: Vec<_> = devices
        .into_iter()
        .filter(|d| {
            [("serialNumber", &d["serialNumber"]), ("locationId", &d["locationId"])]
                .into_iter()
                .any(|(field, v)| v.as_str().is_some_and(|v| *filter == format!("{field} eq '{v}'")))
        })
        .collect();
    Json(json!({"data": matching})).into_response()
}

async fn list_keys(State(up): State<Arc<Upstream>>, headers: HeaderMap) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    up.record("GET /udpKeys".into(), None);
    Json(json!({"data": [
        {"id": "k1", "keyType": "broadcast", "expiresAt": "2030-01-01T00:00:00Z", "deviceIds": ["dev-1"]},
        {"id": "k2", "keyType": "unicast", "expiresAt": "2030-01-01T00:00:00Z"}
    ]}))
    .into_response()
}

async fn create_key(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    up.record("POST /udpKeys".into(), Some(body.clone()));
    Json(json!({"data": {
        "id": "new-key", "keyType": body["keyType"], "expiresAt": "2030-01-08T00:00:00Z"
    }}))
    .into_response()
}

async fn delete_key(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    up.record(format!("DELETE /udpKeys/{id}"), None);
    StatusCode::NO_CONTENT.into_response()
}

async fn assign_key(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    up.record(format!("POST /devices/{id}/udpKeys"), Some(body));
    Json(json!({"data": {}})).into_response()
}

async fn set_position(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if id == "busy" {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": {"message": "Too Many Requests"}})))
            .into_response();
    }
    up.record(format!("POST /devices/{id}/position"), Some(body));
    StatusCode::ACCEPTED.into_response()
}

async fn get_position(headers: HeaderMap) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": {"position": "closed"}})).into_response()
}

async fn connection(headers: HeaderMap) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": {"isConnected": true, "ts": 1607025957}})).into_response()
}

async fn waveform(headers: HeaderMap, Path(id): Path<String>) -> axum::response::Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"data": {"deviceId": id, "numSamples": 2, "data": {"mVp0": [0, 1]}}})).into_response()
}

/// Start a mock vendor API on an ephemeral port.
async fn mock_api() -> (SocketAddr, Arc<Upstream>) {
    let up = Arc::new(Upstream::default());
    let app = Router::new()
        .route("/api/v1/serviceAccount/authToken", post(issue_token))
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/udpKeys", get(list_keys).post(create_key))
        .route("/api/v1/udpKeys/{id}", delete(delete_key))
        .route("/api/v1/devices/{id}/udpKeys", post(assign_key))
        .route(
            "/api/v1/devices/{id}/breaker/remoteHandle/position",
            get(get_position).post(set_position),
        )
        .route("/api/v1/devices/{id}/device/metadata/isConnected", get(connection))
        .route("/api/v1/devices/{id}/waveforms", post(waveform))
        .with_state(Arc::clone(&up));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, up)
}

async fn client_for(addr: SocketAddr, secret: &str) -> anyhow::Result<(EmcbClient, CredentialScope)> {
    let transport = RestTransport::new(format!("http://{addr}/api/v1"), Duration::from_secs(5))?;
    let auth = AuthService::new(Arc::new(transport.clone()), DEFAULT_SAFETY_MARGIN);
    let scope = CredentialScope::organization("org-1");
    auth.register(
        scope.clone(),
        ScopeCredentials {
            subscription_key: "sub-key".into(),
            client_id: "client".into(),
            client_secret: secret.into(),
        },
    )
    .await;
    Ok((EmcbClient::new(transport, auth), scope))
}

#[tokio::test]
async fn issue_token_decodes_grant() -> anyhow::Result<()> {
    let (addr, up) = mock_api().await;
    let transport = RestTransport::new(format!("http://{addr}/api/v1"), Duration::from_secs(5))?;

    let grant = transport.issue_token("sub-key", "client", "secret").await?;

    assert_eq!(grant.token.as_deref(), Some("bearer-1"));
    assert!(grant.expires_at.is_some());
    assert_eq!(up.token_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_issuance_surfaces_auth_error() -> anyhow::Result<()> {
    let (addr, _up) = mock_api().await;
    let (client, scope) = client_for(addr, "wrong").await?;

    let err = client.list_devices(&scope).await.err();

    assert_eq!(
        err,
        Some(ApiError::Auth(AuthError::Rejected { status: 403, message: "invalid client".into() }))
    );
    Ok(())
}

#[tokio::test]
async fn calls_share_one_cached_token() -> anyhow::Result<()> {
    let (addr, up) = mock_api().await;
    let (client, scope) = client_for(addr, "secret").await?;

    let devices = client.list_devices(&scope).await?;
    let keys = client.list_udp_keys(&scope).await?;

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].serial_number.as_deref(), Some("30000e1c248a3f18"));
    assert_eq!(devices[1].location_id.as_deref(), Some("loc-9"));
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].device_ids, vec!["dev-1".to_owned()]);
    assert!(keys[1].device_ids.is_empty());
    assert_eq!(up.token_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn key_lifecycle_requests_hit_expected_endpoints() -> anyhow::Result<()> {
    let (addr, up) = mock_api().await;
    let (client, scope) = client_for(addr, "secret").await?;

    let created = client.create_udp_key(&scope, KeyType::Unicast).await?;
    client.assign_udp_key(&scope, &created.id, Priority::Secondary, "dev-1").await?;
    client.delete_udp_key(&scope, "old-key").await?;

    assert_eq!(created.key_type, "unicast");
    assert_eq!(
        up.requests(),
        vec!["POST /udpKeys", "POST /devices/dev-1/udpKeys", "DELETE /udpKeys/old-key"]
    );
    let bodies = up.bodies();
    assert_eq!(bodies[0], json!({"keyType": "unicast"}));
    assert_eq!(bodies[1], json!({"keyId": "new-key", "priority": "secondary"}));
    Ok(())
}

#[tokio::test]
async fn breaker_commands_and_telemetry() -> anyhow::Result<()> {
    let (addr, up) = mock_api().await;
    let (client, scope) = client_for(addr, "secret").await?;

    client.set_breaker(&scope, "dev-1", BreakerCommand::Open, "maintenance").await?;
    let position = client.handle_position(&scope, "dev-1").await?;
    let connected = client.is_connected(&scope, "dev-1").await?;
    let waveform = client.capture_waveform(&scope, "dev-1").await?;

    assert_eq!(up.bodies()[0], json!({"command": "open", "reason": "maintenance"}));
    assert_eq!(position, HandlePosition::Closed);
    assert!(connected);
    assert_eq!(waveform["deviceId"], "dev-1");
    Ok(())
}

#[tokio::test]
async fn rate_limited_breaker_command_is_retryable() -> anyhow::Result<()> {
    let (addr, _up) = mock_api().await;
    let (client, scope) = client_for(addr, "secret").await?;

    let err = client.set_breaker(&scope, "busy", BreakerCommand::Close, "test").await.err();

    assert_eq!(err, Some(ApiError::RateLimited));
    assert!(err.is_some_and(|e| e.is_retryable()));
    Ok(())
}

#[tokio::test]
async fn device_lookup_sends_filter_expression() -> anyhow::Result<()> {
    let (addr, up) = mock_api().await;
    let (client, scope) = client_for(addr, "secret").await?;

    let by_serial =
        client.find_devices(&scope, &DeviceFilter::serial_number("30000e1c248a3f18")).await?;
    let by_location = client.find_devices(&scope, &DeviceFilter::location("loc-9")).await?;
    let everything = client.find_devices(&scope, &DeviceFilter::default()).await?;

    assert_eq!(by_serial.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), ["dev-1"]);
    assert_eq!(by_location.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), ["dev-2"]);
    assert_eq!(everything.len(), 2);
    assert_eq!(
        up.requests(),
        vec![
            "GET /devices $filter=serialNumber eq '30000e1c248a3f18'",
            "GET /devices $filter=locationId eq 'loc-9'",
            "GET /devices",
        ]
    );
    Ok(())
}

#[test]
fn filter_expression_combines_and_escapes() {
    assert_eq!(DeviceFilter::default().expression(), None);
    assert!(DeviceFilter::default().is_empty());
    assert_eq!(
        DeviceFilter::ancestor_location("site-1").expression().as_deref(),
        Some("ancestorLocationId eq 'site-1'")
    );
    let filter = DeviceFilter {
        serial_number: Some("o'brien".into()),
        location_id: Some("loc-9".into()),
        ancestor_location_id: None,
    };
    assert_eq!(
        filter.expression().as_deref(),
        Some("serialNumber eq 'o''brien' and locationId eq 'loc-9'")
    );
}
