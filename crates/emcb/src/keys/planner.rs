// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn a [`KeyInventory`] into the actions that restore the key invariants.
//!
//! Planning is pure: it reads one snapshot and never looks at the result of
//! an earlier decision in the same pass. An expiring primary always wins:
//! the secondary is replaced and the primary is left to lapse.

use serde::Serialize;

use crate::keys::inventory::{KeyInventory, SlotPair, SlotState};
use crate::keys::{KeyType, Priority};

/// One independent unit of work for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RotationAction {
    /// Create a key of `key_type`, delete `evict` if set, then assign the new
    /// key to `device_id` at `priority`.
    Provision {
        device_id: String,
        key_type: KeyType,
        priority: Priority,
        #[serde(skip_serializing_if = "Option::is_none")]
        evict: Option<String>,
    },
    /// Delete a key that is assigned to no device.
    DeleteOrphan { key_id: String },
}

/// Where a new key goes and which existing key it displaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub priority: Priority,
    pub evict: Option<String>,
}

/// Decide what, if anything, to do for one slot pair.
///
/// Rules, first match wins:
/// 1. no keys: new primary;
/// 2. primary expiring: new secondary, replacing any existing secondary;
/// 3. secondary expiring: new primary, replacing an expiring primary.
///
/// Under rule 3 a fresh primary is kept and the expiring secondary is
/// replaced in its own slot instead.
pub fn place(pair: &SlotPair) -> Option<Placement> {
    use SlotState::{Absent, Expiring, Fresh};

    let (priority, evict) = match (&pair.primary, &pair.secondary) {
        (Absent, Absent) => (Priority::Primary, None),
        (Expiring { .. }, Absent) => (Priority::Secondary, None),
        (Expiring { .. }, Fresh { key_id } | Expiring { key_id }) => {
            (Priority::Secondary, Some(key_id))
        }
        (Fresh { .. }, Expiring { key_id }) => (Priority::Secondary, Some(key_id)),
        (Absent, Expiring { .. }) => (Priority::Primary, None),
        (Fresh { .. }, Fresh { .. } | Absent) | (Absent, Fresh { .. }) => return None,
    };
    Some(Placement { priority, evict: evict.cloned() })
}

/// Every action needed for `inventory`: orphan deletions first, then one
/// provision per device and key type that needs it.
pub fn plan(inventory: &KeyInventory) -> Vec<RotationAction> {
    let orphans = inventory
        .orphans()
        .iter()
        .map(|key_id| RotationAction::DeleteOrphan { key_id: key_id.clone() });

    let provisions = inventory.devices().iter().flat_map(|device| {
        KeyType::ALL.into_iter().filter_map(|key_type| {
            place(device.slots(key_type)).map(|p| RotationAction::Provision {
                device_id: device.device_id.clone(),
                key_type,
                priority: p.priority,
                evict: p.evict,
            })
        })
    });

    orphans.chain(provisions).collect()
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
