// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token lifecycle: credential scopes, tokens, and the scope-keyed cache.
//!
//! Callers only ever hold a [`CredentialScope`]. Client secrets are registered
//! once with the [`service::AuthService`] and never leave it.

pub mod service;
pub mod store;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Default margin before expiry at which a cached token stops being reused.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Whose token is being held.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CredentialScope {
    /// The application service account (global).
    Application,
    /// An organization service account, keyed by organization id.
    Organization(String),
}

impl CredentialScope {
    pub fn organization(id: impl Into<String>) -> Self {
        Self::Organization(id.into())
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => f.write_str("application"),
            Self::Organization(id) => write!(f, "organization:{id}"),
        }
    }
}

/// Secrets needed to issue a token for one scope.
#[derive(Clone, PartialEq, Eq)]
pub struct ScopeCredentials {
    pub subscription_key: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ScopeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeCredentials")
            .field("client_id", &self.client_id)
            .field("subscription_key", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Raw issuance response. Either field may be absent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A complete bearer token. Replaced wholesale on refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    bearer: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(bearer: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self { bearer: bearer.into(), expires_at }
    }

    pub fn bearer(&self) -> &str {
        &self.bearer
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True iff more than `margin` remains before expiry at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let remaining_ms = (self.expires_at - now).num_milliseconds();
        remaining_ms > i64::try_from(margin.as_millis()).unwrap_or(i64::MAX)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("bearer", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TryFrom<TokenGrant> for Token {
    type Error = AuthError;

    fn try_from(grant: TokenGrant) -> Result<Self, Self::Error> {
        let bearer = grant.token.filter(|t| !t.is_empty()).ok_or(AuthError::Incomplete("token"))?;
        let expires_at = grant.expires_at.ok_or(AuthError::Incomplete("expiresAt"))?;
        Ok(Self { bearer, expires_at })
    }
}

/// Headers a vendor API request needs for a scope.
#[derive(Clone)]
pub struct RequestAuth {
    pub subscription_key: String,
    pub bearer: String,
}

impl fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestAuth { .. }")
    }
}
