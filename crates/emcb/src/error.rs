// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared by the token cache, the REST adapter and the rotation engine.

use crate::auth::CredentialScope;

/// Failure to obtain a bearer token for a scope.
///
/// `Clone` because a single in-flight issuance hands its result to every
/// caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no credentials registered for scope {0}")]
    UnknownScope(CredentialScope),
    #[error("token issuance rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("token issuance transport failure: {0}")]
    Transport(String),
    #[error("token issuance response is missing `{0}`")]
    Incomplete(&'static str),
}

/// Failure of a single call to the vendor API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// HTTP 429. The only error callers are expected to retry.
    #[error("too many requests")]
    RateLimited,
    #[error("api request failed ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("api transport failure: {0}")]
    Transport(String),
    #[error("api response could not be decoded: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the caller should retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// A key reported by the API with a type this client does not understand.
///
/// Treated as an API contract violation: the rotation pass that observed it
/// is aborted before any action is planned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("udp key {key_id} has unrecognized key type {key_type:?}")]
pub struct ClassificationError {
    pub key_id: String,
    pub key_type: String,
}

/// Reasons a rotation pass ended before executing its plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RotationError {
    #[error("failed to fetch {what}: {source}")]
    Fetch { what: &'static str, source: ApiError },
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}

/// Failure of one rotation action, naming the API step that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct ActionError {
    pub step: &'static str,
    pub source: ApiError,
}
