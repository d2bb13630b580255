// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client core for the EMCB cloud API: scope-keyed bearer token cache, REST
//! adapter, UDP key rotation engine and UDP frame codec.

pub mod api;
pub mod auth;
pub mod error;
pub mod keys;
pub mod test_support;
pub mod udp;

pub use crate::api::client::EmcbClient;
pub use crate::api::transport::RestTransport;
pub use crate::api::{
    BreakerCommand, BreakerControl, Device, DeviceFilter, HandlePosition, KeyManagement, TokenIssuer,
    UdpKey,
};
pub use crate::auth::service::AuthService;
pub use crate::auth::{CredentialScope, ScopeCredentials, Token};
pub use crate::error::{ApiError, AuthError, RotationError};
pub use crate::keys::scheduler::{RotationPhase, RotationScheduler};
pub use crate::keys::{KeyType, Priority, RotationConfig};
