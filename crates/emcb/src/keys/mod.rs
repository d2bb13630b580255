// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UDP key rotation: inventory, planning, execution and scheduling.
//!
//! Each device can hold two keys of each [`KeyType`], labelled primary and
//! secondary. Keys live for a week; the scheduler re-checks well inside that
//! window and replaces whichever key is close to expiry so that a device is
//! never left without a usable key of either type.

pub mod executor;
pub mod inventory;
pub mod planner;
pub mod scheduler;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default remaining lifetime under which a key counts as expiring.
pub const DEFAULT_EXPIRING_THRESHOLD: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Default wait between full rotation passes.
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default wait after acting before the resulting key set is listed.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(20);

/// Scope of a UDP key on the local network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Shared by all devices.
    Broadcast,
    /// Specific to one device.
    Unicast,
}

impl KeyType {
    pub const ALL: [KeyType; 2] = [KeyType::Broadcast, KeyType::Unicast];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Unicast => "unicast",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Self::Broadcast),
            "unicast" => Ok(Self::Unicast),
            _ => Err(()),
        }
    }
}

/// Label distinguishing the two keys a device holds per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Primary,
    Secondary,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing knobs for the rotation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationConfig {
    /// Keys with less than this remaining are replaced.
    pub expiring_threshold: Duration,
    /// Wait between the end of one pass and the start of the next.
    pub recheck_interval: Duration,
    /// Wait after acting before listing the resulting keys.
    pub settle_delay: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            expiring_threshold: DEFAULT_EXPIRING_THRESHOLD,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}
