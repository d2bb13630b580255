// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device view of the UDP key set.
//!
//! The API returns a flat list of keys, each naming the devices it is assigned
//! to. [`KeyInventory::build`] folds that list into two slots per device and
//! key type. The first key seen for a pair fills the primary slot and the
//! second fills the secondary slot, matching the order in which the API lists
//! them.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{Device, UdpKey};
use crate::error::ClassificationError;
use crate::keys::{KeyType, Priority};

/// State of one (device, key type, priority) slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    Absent,
    Fresh { key_id: String },
    Expiring { key_id: String },
}

impl SlotState {
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Fresh { key_id } | Self::Expiring { key_id } => Some(key_id),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_expiring(&self) -> bool {
        matches!(self, Self::Expiring { .. })
    }
}

/// The primary and secondary slot of one device for one key type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPair {
    pub primary: SlotState,
    pub secondary: SlotState,
}

impl SlotPair {
    pub const EMPTY: SlotPair = SlotPair { primary: SlotState::Absent, secondary: SlotState::Absent };

    pub fn get(&self, priority: Priority) -> &SlotState {
        match priority {
            Priority::Primary => &self.primary,
            Priority::Secondary => &self.secondary,
        }
    }

    /// Fill the first empty slot. Returns `false` when both are occupied.
    fn push(&mut self, state: SlotState) -> bool {
        if self.primary.is_absent() {
            self.primary = state;
        } else if self.secondary.is_absent() {
            self.secondary = state;
        } else {
            return false;
        }
        true
    }
}

/// Slots for a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceKeys {
    pub device_id: String,
    pub broadcast: SlotPair,
    pub unicast: SlotPair,
}

impl DeviceKeys {
    fn new(device_id: String) -> Self {
        Self { device_id, broadcast: SlotPair::EMPTY, unicast: SlotPair::EMPTY }
    }

    pub fn slots(&self, key_type: KeyType) -> &SlotPair {
        match key_type {
            KeyType::Broadcast => &self.broadcast,
            KeyType::Unicast => &self.unicast,
        }
    }

    fn slots_mut(&mut self, key_type: KeyType) -> &mut SlotPair {
        match key_type {
            KeyType::Broadcast => &mut self.broadcast,
            KeyType::Unicast => &mut self.unicast,
        }
    }
}

/// Classified snapshot of every device's keys, plus keys assigned to nobody.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct KeyInventory {
    devices: Vec<DeviceKeys>,
    orphans: Vec<String>,
}

/// Whether a key expiring at `expires_at` has less than `threshold` left at `now`.
pub fn is_expiring(expires_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    match (expires_at - now).to_std() {
        Ok(remaining) => remaining < threshold,
        // Negative remaining time: already expired.
        Err(_) => true,
    }
}

impl KeyInventory {
    /// Classify `keys` against `devices` at instant `now`.
    ///
    /// Every key type is checked before anything else is done, so a single
    /// unrecognized type yields an error and no partial inventory.
    pub fn build(
        devices: &[Device],
        keys: &[UdpKey],
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Self, ClassificationError> {
        let classified = keys
            .iter()
            .map(|key| {
                key.key_type.parse::<KeyType>().map(|kt| (key, kt)).map_err(|()| {
                    ClassificationError { key_id: key.id.clone(), key_type: key.key_type.clone() }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(devices.len());
        let mut inventory = KeyInventory::default();
        for device in devices {
            if index.contains_key(device.id.as_str()) {
                continue;
            }
            index.insert(&device.id, inventory.devices.len());
            inventory.devices.push(DeviceKeys::new(device.id.clone()));
        }

        for (key, key_type) in classified {
            // A key is slotted under its first listed device only.
            let Some(device_id) = key.device_ids.first() else {
                debug!(key_id = %key.id, %key_type, "orphaned udp key");
                inventory.orphans.push(key.id.clone());
                continue;
            };
            let state = if is_expiring(key.expires_at, now, threshold) {
                SlotState::Expiring { key_id: key.id.clone() }
            } else {
                SlotState::Fresh { key_id: key.id.clone() }
            };
            let Some(&pos) = index.get(device_id.as_str()) else {
                debug!(key_id = %key.id, %device_id, "udp key assigned to unmanaged device");
                continue;
            };
            let pair = inventory.devices[pos].slots_mut(key_type);
            if !pair.push(state) {
                warn!(key_id = %key.id, %device_id, %key_type, "ignoring third udp key");
            }
        }

        Ok(inventory)
    }

    pub fn devices(&self) -> &[DeviceKeys] {
        &self.devices
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceKeys> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    /// Keys with no assigned device, in listing order.
    pub fn orphans(&self) -> &[String] {
        &self.orphans
    }
}
