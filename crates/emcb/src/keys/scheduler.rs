// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic check-and-correct loop for UDP keys.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::api::KeyManagement;
use crate::auth::CredentialScope;
use crate::error::RotationError;
use crate::keys::executor::{ActionExecutor, PassReport};
use crate::keys::inventory::KeyInventory;
use crate::keys::planner::plan;
use crate::keys::RotationConfig;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
    Idle,
    Checking,
    Acting,
    Waiting,
}

impl RotationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Acting => "acting",
            Self::Waiting => "waiting",
        }
    }
}

/// Outcome of the most recent pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub finished_at: DateTime<Utc>,
    pub result: Result<PassReport, RotationError>,
}

/// Drives inventory, planning and execution for one credential scope.
pub struct RotationScheduler {
    keys: Arc<dyn KeyManagement>,
    scope: CredentialScope,
    config: RotationConfig,
    executor: ActionExecutor,
    phase: watch::Sender<RotationPhase>,
    last_pass: watch::Sender<Option<PassSummary>>,
    /// Serializes on-demand passes with the loop.
    pass_lock: Mutex<()>,
}

impl RotationScheduler {
    pub fn new(keys: Arc<dyn KeyManagement>, scope: CredentialScope, config: RotationConfig) -> Self {
        let executor = ActionExecutor::new(Arc::clone(&keys), scope.clone());
        let (phase, _) = watch::channel(RotationPhase::Idle);
        let (last_pass, _) = watch::channel(None);
        Self { keys, scope, config, executor, phase, last_pass, pass_lock: Mutex::new(()) }
    }

    pub fn scope(&self) -> &CredentialScope {
        &self.scope
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    pub fn phase(&self) -> watch::Receiver<RotationPhase> {
        self.phase.subscribe()
    }

    pub fn last_pass(&self) -> watch::Receiver<Option<PassSummary>> {
        self.last_pass.subscribe()
    }

    fn set_phase(&self, phase: RotationPhase) {
        self.phase.send_replace(phase);
    }

    /// Run one check-and-correct pass outside the regular schedule.
    ///
    /// Afterwards the phase goes back to `Waiting` if the loop is running and
    /// to `Idle` otherwise.
    pub async fn run_pass(&self) -> Result<PassReport, RotationError> {
        let _guard = self.pass_lock.lock().await;
        // No pass is in progress while the lock is held, so any phase other
        // than `Idle` belongs to a running loop between passes.
        let resume = match *self.phase.borrow() {
            RotationPhase::Idle => RotationPhase::Idle,
            _ => RotationPhase::Waiting,
        };
        let result = self.locked_pass().await;
        self.set_phase(resume);
        result
    }

    /// Loop until `shutdown` fires. Cancellation is observed between phases,
    /// so actions already started are allowed to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            scope = %self.scope,
            interval_secs = self.config.recheck_interval.as_secs(),
            "udp key rotation started"
        );
        while !shutdown.is_cancelled() {
            let acted = match self.pass().await {
                Ok(report) => report.planned > 0,
                Err(_) => false,
            };
            self.set_phase(RotationPhase::Waiting);

            if acted {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.settle_delay) => {}
                }
                self.log_keys().await;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.recheck_interval) => {}
            }
        }
        self.set_phase(RotationPhase::Idle);
        tracing::info!(scope = %self.scope, "udp key rotation stopped");
    }

    async fn pass(&self) -> Result<PassReport, RotationError> {
        let _guard = self.pass_lock.lock().await;
        self.locked_pass().await
    }

    /// One pass; the caller holds `pass_lock`.
    async fn locked_pass(&self) -> Result<PassReport, RotationError> {
        let result = self.check_and_correct().await;
        match &result {
            Ok(report) => tracing::info!(
                scope = %self.scope,
                planned = report.planned,
                succeeded = report.succeeded,
                failed = report.failed,
                "rotation pass complete"
            ),
            Err(e) => tracing::warn!(scope = %self.scope, err = %e, "rotation pass aborted"),
        }
        self.last_pass
            .send_replace(Some(PassSummary { finished_at: Utc::now(), result: result.clone() }));
        result
    }

    async fn check_and_correct(&self) -> Result<PassReport, RotationError> {
        self.set_phase(RotationPhase::Checking);
        let (devices, keys) = tokio::try_join!(
            async {
                self.keys
                    .list_devices(&self.scope)
                    .await
                    .map_err(|source| RotationError::Fetch { what: "devices", source })
            },
            async {
                self.keys
                    .list_udp_keys(&self.scope)
                    .await
                    .map_err(|source| RotationError::Fetch { what: "udp keys", source })
            },
        )?;
        let inventory =
            KeyInventory::build(&devices, &keys, Utc::now(), self.config.expiring_threshold)?;

        self.set_phase(RotationPhase::Acting);
        let actions = plan(&inventory);
        tracing::debug!(
            devices = inventory.devices().len(),
            orphans = inventory.orphans().len(),
            actions = actions.len(),
            "rotation plan"
        );
        Ok(self.executor.execute(actions).await)
    }

    /// List the key set after changes have propagated and log it.
    async fn log_keys(&self) {
        match self.keys.list_udp_keys(&self.scope).await {
            Ok(keys) => {
                for key in &keys {
                    tracing::info!(
                        key_id = %key.id,
                        key_type = %key.key_type,
                        expires_at = %key.expires_at,
                        devices = ?key.device_ids,
                        "udp key"
                    );
                }
            }
            Err(e) => tracing::warn!(scope = %self.scope, err = %e, "failed to list udp keys"),
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
