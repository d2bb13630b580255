// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run a rotation plan against the key-management API.
//!
//! All actions of a plan start together and every one runs to completion;
//! a failing action is recorded and logged without affecting its siblings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::api::KeyManagement;
use crate::auth::CredentialScope;
use crate::error::{ActionError, ApiError};
use crate::keys::planner::RotationAction;
use crate::keys::{KeyType, Priority};

/// Result of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: RotationAction,
    /// Id of the key created by a provision, on success.
    pub result: Result<Option<String>, ActionError>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of one executed plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<ActionOutcome>,
}

/// Executes [`RotationAction`]s for one credential scope.
#[derive(Clone)]
pub struct ActionExecutor {
    keys: Arc<dyn KeyManagement>,
    scope: CredentialScope,
}

impl ActionExecutor {
    pub fn new(keys: Arc<dyn KeyManagement>, scope: CredentialScope) -> Self {
        Self { keys, scope }
    }

    /// Run every action concurrently and wait for all of them.
    pub async fn execute(&self, actions: Vec<RotationAction>) -> PassReport {
        let started_at = Utc::now();
        let planned = actions.len();
        let outcomes = join_all(actions.into_iter().map(|action| async move {
            let result = self.run(&action).await;
            ActionOutcome { action, result }
        }))
        .await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        PassReport {
            started_at,
            finished_at: Utc::now(),
            planned,
            succeeded,
            failed: planned - succeeded,
            outcomes,
        }
    }

    async fn run(&self, action: &RotationAction) -> Result<Option<String>, ActionError> {
        match action {
            RotationAction::Provision { device_id, key_type, priority, evict } => self
                .provision(device_id, *key_type, *priority, evict.as_deref())
                .await
                .map(Some),
            RotationAction::DeleteOrphan { key_id } => {
                let result = self.keys.delete_udp_key(&self.scope, key_id).await;
                match result {
                    Ok(()) => {
                        info!(%key_id, "deleted orphaned udp key");
                        Ok(None)
                    }
                    Err(e) => {
                        warn!(%key_id, err = %e, "failed to delete orphaned udp key");
                        Err(step("delete", e))
                    }
                }
            }
        }
    }

    /// Create, evict, assign. Any failure stops the unit; a created key left
    /// unassigned shows up as an orphan on the next pass.
    async fn provision(
        &self,
        device_id: &str,
        key_type: KeyType,
        priority: Priority,
        evict: Option<&str>,
    ) -> Result<String, ActionError> {
        let result = async {
            let key = self
                .keys
                .create_udp_key(&self.scope, key_type)
                .await
                .map_err(|e| step("create", e))?;
            if let Some(old) = evict {
                self.keys.delete_udp_key(&self.scope, old).await.map_err(|e| step("delete", e))?;
            }
            self.keys
                .assign_udp_key(&self.scope, &key.id, priority, device_id)
                .await
                .map_err(|e| step("assign", e))?;
            Ok::<_, ActionError>(key.id)
        }
        .await;

        match &result {
            Ok(key_id) => info!(
                %device_id,
                %key_type,
                %priority,
                %key_id,
                evicted = evict.unwrap_or("-"),
                "rotated udp key"
            ),
            Err(e) => warn!(%device_id, %key_type, %priority, err = %e, "udp key rotation failed"),
        }
        result
    }
}

fn step(step: &'static str, source: ApiError) -> ActionError {
    ActionError { step, source }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
