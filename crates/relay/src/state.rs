// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use emcb::{ApiError, BreakerControl, CredentialScope, Device, KeyManagement, RotationScheduler};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;

/// Versioned device list. The version moves only when the list itself changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub version: u64,
    pub devices: Vec<Device>,
}

/// Shared relay state.
pub struct RelayState {
    pub config: RelayConfig,
    /// Organization scope every relayed call is made under.
    pub scope: CredentialScope,
    pub keys: Arc<dyn KeyManagement>,
    pub breakers: Arc<dyn BreakerControl>,
    pub devices: RwLock<DeviceSnapshot>,
    /// Absent when rotation is disabled.
    pub scheduler: Option<Arc<RotationScheduler>>,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(
        config: RelayConfig,
        scope: CredentialScope,
        keys: Arc<dyn KeyManagement>,
        breakers: Arc<dyn BreakerControl>,
        scheduler: Option<Arc<RotationScheduler>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            scope,
            keys,
            breakers,
            devices: RwLock::new(DeviceSnapshot::default()),
            scheduler,
            shutdown,
        }
    }

    /// Fetch the device list and bump the snapshot version if it changed.
    pub async fn refresh_devices(&self) -> Result<DeviceSnapshot, ApiError> {
        let devices = self.keys.list_devices(&self.scope).await?;
        let mut snapshot = self.devices.write().await;
        if snapshot.version == 0 || snapshot.devices != devices {
            snapshot.version += 1;
            snapshot.devices = devices;
            tracing::info!(version = snapshot.version, count = snapshot.devices.len(), "device list updated");
        }
        Ok(snapshot.clone())
    }
}
