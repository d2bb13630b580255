// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scope-keyed token cache.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::auth::{CredentialScope, Token};

/// Whether a (possibly absent) token may be reused at `now`.
pub fn is_valid(token: Option<&Token>, now: DateTime<Utc>, margin: Duration) -> bool {
    token.is_some_and(|t| t.is_valid_at(now, margin))
}

/// Holds at most one token per scope.
#[derive(Debug)]
pub struct TokenStore {
    entries: HashMap<CredentialScope, Token>,
    margin: Duration,
}

impl TokenStore {
    pub fn new(margin: Duration) -> Self {
        Self { entries: HashMap::new(), margin }
    }

    /// The cached token for `scope`, only if it is still valid at `now`.
    pub fn valid(&self, scope: &CredentialScope, now: DateTime<Utc>) -> Option<&Token> {
        self.entries.get(scope).filter(|t| is_valid(Some(t), now, self.margin))
    }

    /// The cached token for `scope`, valid or not.
    pub fn get(&self, scope: &CredentialScope) -> Option<&Token> {
        self.entries.get(scope)
    }

    /// Replace the entry for `scope`, returning the previous token.
    pub fn replace(&mut self, scope: CredentialScope, token: Token) -> Option<Token> {
        self.entries.insert(scope, token)
    }

    pub fn remove(&mut self, scope: &CredentialScope) -> Option<Token> {
        self.entries.remove(scope)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
