// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: an in-memory vendor API.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use crate::api::{
    BreakerCommand, BreakerControl, Device, DeviceFilter, HandlePosition, KeyManagement, UdpKey,
};
use crate::auth::CredentialScope;
use crate::error::ApiError;
use crate::keys::{KeyType, Priority};

/// In-memory stand-in for the key-management and breaker endpoints.
///
/// Failures are injected per operation and target (device id, key id or key
/// type), and every call is recorded as `"op target"`.
#[derive(Default)]
pub struct MemoryApi {
    state: Mutex<MemoryState>,
    latency: Duration,
}

#[derive(Default)]
struct MemoryState {
    devices: Vec<Device>,
    /// Ancestor location ids per device id.
    ancestors: HashMap<String, Vec<String>>,
    keys: Vec<UdpKey>,
    assignments: Vec<(String, Priority, String)>,
    positions: HashMap<String, HandlePosition>,
    failures: HashMap<(String, String), ApiError>,
    calls: Vec<String>,
    next_id: u32,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (use with paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_devices(self, ids: &[&str]) -> Self {
        self.lock().devices.extend(ids.iter().map(|id| Device::new(*id)));
        self
    }

    /// Add a fully described device placed under `ancestors` in the location tree.
    pub fn with_device(self, device: Device, ancestors: &[&str]) -> Self {
        {
            let mut state = self.lock();
            state
                .ancestors
                .insert(device.id.clone(), ancestors.iter().map(|a| a.to_string()).collect());
            state.devices.push(device);
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a key expiring `expires_in` from now.
    pub fn add_key(&self, id: &str, key_type: &str, expires_in: TimeDelta, device: Option<&str>) {
        self.lock().keys.push(UdpKey {
            id: id.into(),
            key_type: key_type.into(),
            expires_at: Utc::now() + expires_in,
            device_ids: device.into_iter().map(String::from).collect(),
            key: None,
        });
    }

    /// Make `op` on `target` fail with `err` until cleared.
    pub fn fail(&self, op: &str, target: &str, err: ApiError) {
        self.lock().failures.insert((op.into(), target.into()), err);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn keys(&self) -> Vec<UdpKey> {
        self.lock().keys.clone()
    }

    /// `(key id, priority, device id)` for every successful assignment.
    pub fn assignments(&self) -> Vec<(String, Priority, String)> {
        self.lock().assignments.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.split(' ').next() == Some(op)).count()
    }

    pub fn position(&self, device_id: &str) -> Option<HandlePosition> {
        self.lock().positions.get(device_id).copied()
    }

    /// Record the call, wait out the latency, then apply injected failures.
    async fn enter(&self, op: &str, target: &str) -> Result<(), ApiError> {
        self.lock().calls.push(format!("{op} {target}"));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.lock().failures.get(&(op.to_owned(), target.to_owned())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn known_device(&self, device_id: &str) -> Result<(), ApiError> {
        if self.lock().devices.iter().any(|d| d.id == device_id) {
            Ok(())
        } else {
            Err(ApiError::Status { status: 404, message: format!("device {device_id} not found") })
        }
    }
}

#[async_trait::async_trait]
impl KeyManagement for MemoryApi {
    async fn list_devices(&self, _scope: &CredentialScope) -> Result<Vec<Device>, ApiError> {
        self.enter("list_devices", "*").await?;
        Ok(self.lock().devices.clone())
    }

    async fn find_devices(
        &self,
        _scope: &CredentialScope,
        filter: &DeviceFilter,
    ) -> Result<Vec<Device>, ApiError> {
        self.enter("find_devices", &filter.expression().unwrap_or_else(|| "*".into())).await?;
        let state = self.lock();
        let field_matches = |want: &Option<String>, have: Option<&str>| {
            want.as_deref().is_none_or(|w| have == Some(w))
        };
        Ok(state
            .devices
            .iter()
            .filter(|d| field_matches(&filter.serial_number, d.serial_number.as_deref()))
            .filter(|d| field_matches(&filter.location_id, d.location_id.as_deref()))
            .filter(|d| {
                filter.ancestor_location_id.as_deref().is_none_or(|want| {
                    d.location_id.as_deref() == Some(want)
                        || state.ancestors.get(&d.id).is_some_and(|a| a.iter().any(|a| a == want))
                })
            })
            .cloned()
            .collect())
    }

    async fn list_udp_keys(&self, _scope: &CredentialScope) -> Result<Vec<UdpKey>, ApiError> {
        self.enter("list_udp_keys", "*").await?;
        Ok(self.lock().keys.clone())
    }

    async fn create_udp_key(
        &self,
        _scope: &CredentialScope,
        key_type: KeyType,
    ) -> Result<UdpKey, ApiError> {
        self.enter("create", key_type.as_str()).await?;
        let mut state = self.lock();
        state.next_id += 1;
        let key = UdpKey {
            id: format!("new-{}", state.next_id),
            key_type: key_type.as_str().into(),
            // Created keys live for a week.
            expires_at: Utc::now() + TimeDelta::days(7),
            device_ids: Vec::new(),
            key: None,
        };
        state.keys.push(key.clone());
        Ok(key)
    }

    async fn delete_udp_key(&self, _scope: &CredentialScope, key_id: &str) -> Result<(), ApiError> {
        self.enter("delete", key_id).await?;
        let mut state = self.lock();
        let before = state.keys.len();
        state.keys.retain(|k| k.id != key_id);
        if state.keys.len() == before {
            return Err(ApiError::Status { status: 404, message: format!("key {key_id} not found") });
        }
        Ok(())
    }

    async fn assign_udp_key(
        &self,
        _scope: &CredentialScope,
        key_id: &str,
        priority: Priority,
        device_id: &str,
    ) -> Result<(), ApiError> {
        self.enter("assign", device_id).await?;
        self.known_device(device_id)?;
        let mut state = self.lock();
        let Some(key) = state.keys.iter_mut().find(|k| k.id == key_id) else {
            return Err(ApiError::Status { status: 404, message: format!("key {key_id} not found") });
        };
        key.device_ids.push(device_id.into());
        state.assignments.push((key_id.into(), priority, device_id.into()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl BreakerControl for MemoryApi {
    async fn set_breaker(
        &self,
        _scope: &CredentialScope,
        device_id: &str,
        command: BreakerCommand,
        _reason: &str,
    ) -> Result<(), ApiError> {
        self.enter("set_breaker", device_id).await?;
        self.known_device(device_id)?;
        let position = match command {
            BreakerCommand::Open => HandlePosition::Open,
            BreakerCommand::Close => HandlePosition::Closed,
        };
        self.lock().positions.insert(device_id.into(), position);
        Ok(())
    }

    async fn handle_position(
        &self,
        _scope: &CredentialScope,
        device_id: &str,
    ) -> Result<HandlePosition, ApiError> {
        self.enter("handle_position", device_id).await?;
        self.known_device(device_id)?;
        Ok(self.position(device_id).unwrap_or(HandlePosition::Closed))
    }

    async fn is_connected(
        &self,
        _scope: &CredentialScope,
        device_id: &str,
    ) -> Result<bool, ApiError> {
        self.enter("is_connected", device_id).await?;
        Ok(self.known_device(device_id).is_ok())
    }

    async fn capture_waveform(
        &self,
        _scope: &CredentialScope,
        device_id: &str,
    ) -> Result<serde_json::Value, ApiError> {
        self.enter("capture_waveform", device_id).await?;
        self.known_device(device_id)?;
        Ok(serde_json::json!({ "deviceId": device_id, "numSamples": 0, "data": {} }))
    }
}
