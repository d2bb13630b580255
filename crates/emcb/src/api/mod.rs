// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vendor REST API: collaborator traits, wire types and the HTTP adapter.

pub mod client;
pub mod transport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialScope, TokenGrant};
use crate::error::{ApiError, AuthError};
use crate::keys::{KeyType, Priority};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.em.eaton.com/api/v1";

/// Issues bearer tokens for a service account. Bearer-less.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(
        &self,
        subscription_key: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenGrant, AuthError>;
}

/// Device listing and UDP key management for one credential scope.
#[async_trait::async_trait]
pub trait KeyManagement: Send + Sync {
    async fn list_devices(&self, scope: &CredentialScope) -> Result<Vec<Device>, ApiError>;

    /// Devices matching every field set in `filter`.
    async fn find_devices(
        &self,
        scope: &CredentialScope,
        filter: &DeviceFilter,
    ) -> Result<Vec<Device>, ApiError>;

    async fn list_udp_keys(&self, scope: &CredentialScope) -> Result<Vec<UdpKey>, ApiError>;

    async fn create_udp_key(
        &self,
        scope: &CredentialScope,
        key_type: KeyType,
    ) -> Result<UdpKey, ApiError>;

    async fn delete_udp_key(&self, scope: &CredentialScope, key_id: &str) -> Result<(), ApiError>;

    async fn assign_udp_key(
        &self,
        scope: &CredentialScope,
        key_id: &str,
        priority: Priority,
        device_id: &str,
    ) -> Result<(), ApiError>;
}

/// Remote breaker commands and telemetry.
#[async_trait::async_trait]
pub trait BreakerControl: Send + Sync {
    async fn set_breaker(
        &self,
        scope: &CredentialScope,
        device_id: &str,
        command: BreakerCommand,
        reason: &str,
    ) -> Result<(), ApiError>;

    async fn handle_position(
        &self,
        scope: &CredentialScope,
        device_id: &str,
    ) -> Result<HandlePosition, ApiError>;

    async fn is_connected(&self, scope: &CredentialScope, device_id: &str)
        -> Result<bool, ApiError>;

    /// Trigger and fetch a waveform capture. Returned as the raw document.
    async fn capture_waveform(
        &self,
        scope: &CredentialScope,
        device_id: &str,
    ) -> Result<serde_json::Value, ApiError>;
}

// -- Wire types ---------------------------------------------------------------

/// Every API response body wraps its payload in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A managed breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), serial_number: None, location_id: None, hardware_type: None, sku: None }
    }
}

/// Device lookup by serial number, location, or any ancestor location.
///
/// Set fields are combined with `and` into the API's `$filter` expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
    pub serial_number: Option<String>,
    pub location_id: Option<String>,
    pub ancestor_location_id: Option<String>,
}

impl DeviceFilter {
    pub fn serial_number(serial: impl Into<String>) -> Self {
        Self { serial_number: Some(serial.into()), ..Self::default() }
    }

    pub fn location(location_id: impl Into<String>) -> Self {
        Self { location_id: Some(location_id.into()), ..Self::default() }
    }

    pub fn ancestor_location(location_id: impl Into<String>) -> Self {
        Self { ancestor_location_id: Some(location_id.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses().next().is_none()
    }

    /// The `$filter` expression, e.g. `serialNumber eq '3000...'`.
    pub fn expression(&self) -> Option<String> {
        let clauses: Vec<String> = self
            .clauses()
            .map(|(field, value)| format!("{field} eq '{}'", value.replace('\'', "''")))
            .collect();
        (!clauses.is_empty()).then(|| clauses.join(" and "))
    }

    fn clauses(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("serialNumber", &self.serial_number),
            ("locationId", &self.location_id),
            ("ancestorLocationId", &self.ancestor_location_id),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
    }
}

/// A UDP key as listed by the API.
///
/// `key_type` is kept as the raw wire string; classification happens when the
/// inventory is built so that an unexpected value aborts the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpKey {
    pub id: String,
    pub key_type: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub device_ids: Vec<String>,
    /// Key material, when the API includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Remote handle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerCommand {
    Open,
    Close,
}

impl BreakerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

/// Reported remote handle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlePosition {
    Open,
    Closed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IssueTokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateKeyRequest {
    pub key_type: KeyType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AssignKeyRequest<'a> {
    pub key_id: &'a str,
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetBreakerRequest<'a> {
    pub command: BreakerCommand,
    pub reason: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PositionBody {
    pub position: HandlePosition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectionBody {
    pub is_connected: bool,
}
