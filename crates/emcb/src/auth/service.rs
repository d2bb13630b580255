// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Get-or-refresh token service with per-scope request coalescing.
//!
//! At most one issuance is in flight per scope. Callers arriving while one is
//! outstanding await the same shared future, so they all observe the same
//! token or the same error. A failed issuance leaves the cache untouched and
//! the next call starts over.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::TokenIssuer;
use crate::auth::store::TokenStore;
use crate::auth::{CredentialScope, RequestAuth, ScopeCredentials, Token};
use crate::error::AuthError;

type Issuance = Shared<BoxFuture<'static, Result<Token, AuthError>>>;

struct State {
    credentials: HashMap<CredentialScope, ScopeCredentials>,
    store: TokenStore,
    in_flight: HashMap<CredentialScope, Issuance>,
}

struct Inner {
    issuer: Arc<dyn TokenIssuer>,
    state: Mutex<State>,
}

/// Shared handle to the token cache. Cheap to clone.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<Inner>,
}

impl AuthService {
    pub fn new(issuer: Arc<dyn TokenIssuer>, safety_margin: Duration) -> Self {
        let state = State {
            credentials: HashMap::new(),
            store: TokenStore::new(safety_margin),
            in_flight: HashMap::new(),
        };
        Self { inner: Arc::new(Inner { issuer, state: Mutex::new(state) }) }
    }

    /// Register (or replace) the credentials for a scope.
    ///
    /// A cached token issued under the previous credentials is dropped.
    pub async fn register(&self, scope: CredentialScope, credentials: ScopeCredentials) {
        let mut state = self.inner.state.lock().await;
        let replaced = state.credentials.insert(scope.clone(), credentials);
        if replaced.is_some() {
            state.store.remove(&scope);
        }
        debug!(%scope, replaced = replaced.is_some(), "credentials registered");
    }

    /// Scopes with registered credentials.
    pub async fn scopes(&self) -> Vec<CredentialScope> {
        self.inner.state.lock().await.credentials.keys().cloned().collect()
    }

    /// Return a valid token for `scope`, issuing a new one if needed.
    pub async fn token(&self, scope: &CredentialScope) -> Result<Token, AuthError> {
        self.acquire(scope, false).await
    }

    /// Issue a new token for `scope` even if the cached one is still valid.
    ///
    /// Joins an issuance that is already in flight rather than starting a second.
    pub async fn refresh(&self, scope: &CredentialScope) -> Result<Token, AuthError> {
        self.acquire(scope, true).await
    }

    /// Drop the cached token for `scope`. The next [`token`](Self::token) call re-issues.
    pub async fn invalidate(&self, scope: &CredentialScope) {
        self.inner.state.lock().await.store.remove(scope);
    }

    /// Subscription key and bearer for an authenticated API request.
    pub async fn request_auth(&self, scope: &CredentialScope) -> Result<RequestAuth, AuthError> {
        let token = self.token(scope).await?;
        let state = self.inner.state.lock().await;
        let credentials =
            state.credentials.get(scope).ok_or_else(|| AuthError::UnknownScope(scope.clone()))?;
        Ok(RequestAuth {
            subscription_key: credentials.subscription_key.clone(),
            bearer: token.bearer().to_owned(),
        })
    }

    async fn acquire(&self, scope: &CredentialScope, force: bool) -> Result<Token, AuthError> {
        let issuance = {
            let mut state = self.inner.state.lock().await;
            if !force {
                if let Some(token) = state.store.valid(scope, Utc::now()) {
                    debug!(%scope, "using cached token");
                    return Ok(token.clone());
                }
            }
            match state.in_flight.get(scope) {
                Some(existing) => {
                    debug!(%scope, "joining in-flight token issuance");
                    existing.clone()
                }
                None => {
                    let credentials = state
                        .credentials
                        .get(scope)
                        .cloned()
                        .ok_or_else(|| AuthError::UnknownScope(scope.clone()))?;
                    let issuance = self.issue(scope.clone(), credentials).boxed().shared();
                    state.in_flight.insert(scope.clone(), issuance.clone());
                    issuance
                }
            }
        };
        issuance.await
    }

    /// Build the shared issuance future for one scope.
    ///
    /// The future itself stores the result and clears the in-flight slot, so
    /// the outcome is recorded exactly once however many callers await it.
    fn issue(
        &self,
        scope: CredentialScope,
        credentials: ScopeCredentials,
    ) -> impl Future<Output = Result<Token, AuthError>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = inner
                .issuer
                .issue_token(
                    &credentials.subscription_key,
                    &credentials.client_id,
                    &credentials.client_secret,
                )
                .await
                .and_then(Token::try_from);

            let mut state = inner.state.lock().await;
            state.in_flight.remove(&scope);
            match &result {
                Ok(token) => {
                    // Credentials may have been replaced while the request was out.
                    if state.credentials.get(&scope) == Some(&credentials) {
                        state.store.replace(scope.clone(), token.clone());
                    }
                    info!(%scope, expires_at = %token.expires_at(), "token issued");
                }
                Err(e) => warn!(%scope, err = %e, "token issuance failed"),
            }
            result
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
