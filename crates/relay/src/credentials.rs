// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential files written during provisioning.
//!
//! The application file holds the subscription key and the application
//! service account. The organization file is the document the API returns
//! when an organization is created; its service account is what the relay
//! and the rotation engine act as.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use emcb::{AuthService, CredentialScope, ScopeCredentials};
use serde::Deserialize;

/// Application credential file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppCredentials {
    /// Subscription key sent as `Em-Api-Subscription-Key` on every request.
    pub api_key: String,
    pub client_id: String,
    pub client_secret1: String,
}

/// Organization document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgCredentials {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub service_account: ServiceAccount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    pub client_id: String,
    pub secrets: Vec<ServiceSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSecret {
    #[serde(default)]
    pub name: Option<String>,
    pub value: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl OrgCredentials {
    /// First secret that has not expired at `now`, falling back to the first listed.
    pub fn secret(&self, now: DateTime<Utc>) -> Option<&ServiceSecret> {
        let secrets = &self.service_account.secrets;
        secrets.iter().find(|s| s.expiry.is_none_or(|e| e > now)).or_else(|| secrets.first())
    }

    pub fn scope(&self) -> CredentialScope {
        CredentialScope::organization(&self.id)
    }
}

/// Both credential documents.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app: AppCredentials,
    pub org: OrgCredentials,
}

impl Credentials {
    pub fn load(app_path: &Path, org_path: &Path) -> anyhow::Result<Self> {
        let app = read_json(app_path).context("loading application credentials")?;
        let org = read_json(org_path).context("loading organization credentials")?;
        Ok(Self { app, org })
    }

    /// Register the application and organization scopes; returns the organization scope.
    pub async fn register(&self, auth: &AuthService) -> anyhow::Result<CredentialScope> {
        let secret = self
            .org
            .secret(Utc::now())
            .with_context(|| format!("organization {} has no service account secret", self.org.id))?;

        auth.register(
            CredentialScope::Application,
            ScopeCredentials {
                subscription_key: self.app.api_key.clone(),
                client_id: self.app.client_id.clone(),
                client_secret: self.app.client_secret1.clone(),
            },
        )
        .await;

        let scope = self.org.scope();
        auth.register(
            scope.clone(),
            ScopeCredentials {
                subscription_key: self.app.api_key.clone(),
                client_id: self.org.service_account.client_id.clone(),
                client_secret: secret.value.clone(),
            },
        )
        .await;

        tracing::info!(
            org = %self.org.id,
            name = self.org.name.as_deref().unwrap_or(""),
            secret = secret.name.as_deref().unwrap_or(""),
            "credentials registered"
        );
        Ok(scope)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
