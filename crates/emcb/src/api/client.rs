// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated API client: every call obtains its bearer through [`AuthService`].

use reqwest::Method;

use crate::api::transport::RestTransport;
use crate::api::{
    AssignKeyRequest, BreakerCommand, BreakerControl, ConnectionBody, CreateKeyRequest, Device,
    DeviceFilter, HandlePosition, KeyManagement, PositionBody, SetBreakerRequest, UdpKey,
};
use crate::auth::service::AuthService;
use crate::auth::CredentialScope;
use crate::error::ApiError;
use crate::keys::{KeyType, Priority};

/// Vendor API client shared by the rotation engine and the relay.
#[derive(Clone)]
pub struct EmcbClient {
    transport: RestTransport,
    auth: AuthService,
}

impl EmcbClient {
    pub fn new(transport: RestTransport, auth: AuthService) -> Self {
        Self { transport, auth }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    async fn authed(
        &self,
        method: Method,
        path: &str,
        scope: &CredentialScope,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let auth = self.auth.request_auth(scope).await?;
        Ok(self.transport.request(method, path, Some(&auth)))
    }
}

#[async_trait::async_trait]
impl KeyManagement for EmcbClient {
    async fn list_devices(&self, scope: &CredentialScope) -> Result<Vec<Device>, ApiError> {
        let req = self.authed(Method::GET, "/devices", scope).await?;
        self.transport.send(req).await
    }

    async fn find_devices(
        &self,
        scope: &CredentialScope,
        filter: &DeviceFilter,
    ) -> Result<Vec<Device>, ApiError> {
        let req = self.authed(Method::GET, "/devices", scope).await?;
        let req = match filter.expression() {
            Some(expr) => req.query(&[("$filter", expr)]),
            None => req,
        };
        self.transport.send(req).await
    }

    async fn list_udp_keys(&self, scope: &CredentialScope) -> Result<Vec<UdpKey>, ApiError> {
        let req = self.authed(Method::GET, "/udpKeys", scope).await?;
        self.transport.send(req).await
    }

    async fn create_udp_key(
        &self,
        scope: &CredentialScope,
        key_type: KeyType,
    ) -> Result<UdpKey, ApiError> {
        let req = self.authed(Method::POST, "/udpKeys", scope).await?;
        self.transport.send(req.json(&CreateKeyRequest { key_type })).await
    }

    async fn delete_udp_key(&self, scope: &CredentialScope, key_id: &str) -> Result<(), ApiError> {
        let req = self.authed(Method::DELETE, &format!("/udpKeys/{key_id}"), scope).await?;
        self.transport.send_empty(req).await
    }

    async fn assign_udp_key(
        &self,
        scope: &CredentialScope,
        key_id: &str,
        priority: Priority,
        device_id: &str,
    ) -> Result<(), ApiError> {
        let req = self.authed(Method::POST, &format!("/devices/{device_id}/udpKeys"), scope).await?;
        self.transport.send_empty(req.json(&AssignKeyRequest { key_id, priority })).await
    }
}

#[async_trait::async_trait]
impl BreakerControl for EmcbClient {
    async fn set_breaker(
        &self,
        scope: &CredentialScope,
        device_id: &str,
        command: BreakerCommand,
        reason: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/devices/{device_id}/breaker/remoteHandle/position");
        let req = self.authed(Method::POST, &path, scope).await?;
        self.transport.send_empty(req.json(&SetBreakerRequest { command, reason })).await?;
        tracing::info!(device_id, command = command.as_str(), "breaker command accepted");
        Ok(())
    }

    async fn handle_position(
        &self,
        scope: &CredentialScope,
        device_id: &str,
    ) -> Result<HandlePosition, ApiError> {
        let path = format!("/devices/{device_id}/breaker/remoteHandle/position");
        let req = self.authed(Method::GET, &path, scope).await?;
        let body: PositionBody = self.transport.send(req).await?;
        Ok(body.position)
    }

    async fn is_connected(
        &self,
        scope: &CredentialScope,
        device_id: &str,
    ) -> Result<bool, ApiError> {
        let path = format!("/devices/{device_id}/device/metadata/isConnected");
        let req = self.authed(Method::GET, &path, scope).await?;
        let body: ConnectionBody = self.transport.send(req).await?;
        Ok(body.is_connected)
    }

    async fn capture_waveform(
        &self,
        scope: &CredentialScope,
        device_id: &str,
    ) -> Result<serde_json::Value, ApiError> {
        let req = self.authed(Method::POST, &format!("/devices/{device_id}/waveforms"), scope).await?;
        self.transport.send(req).await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
