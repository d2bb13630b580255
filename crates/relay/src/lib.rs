// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! emcb-relay: realtime breaker command relay and UDP key rotation service.

pub mod config;
pub mod credentials;
pub mod error;
pub mod state;
pub mod transport;

use std::sync::Arc;

use anyhow::Context;
use emcb::{AuthService, EmcbClient, RestTransport, RotationScheduler};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::credentials::Credentials;
use crate::state::RelayState;
use crate::transport::build_router;

/// Run the relay and the rotation scheduler until shutdown.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let transport = RestTransport::new(config.base_url.clone(), config.request_timeout())
        .context("building http client")?;
    let auth = AuthService::new(Arc::new(transport.clone()), config.token_margin());
    let credentials = Credentials::load(&config.app_credentials, &config.org_credentials)?;
    let scope = credentials.register(&auth).await?;
    tracing::info!(scopes = ?auth.scopes().await, "credentials registered");
    let client = Arc::new(EmcbClient::new(transport, auth));

    let scheduler = (!config.no_rotation).then(|| {
        Arc::new(RotationScheduler::new(client.clone(), scope.clone(), config.rotation()))
    });

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let state = Arc::new(RelayState::new(config, scope, client.clone(), client, scheduler, shutdown));
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!(scope = %state.scope, rotation = state.scheduler.is_some(), "emcb-relay listening on {addr}");
    serve(listener, state).await
}

/// Serve the relay on `listener` and run the rotation loop beside it.
///
/// Returns once `state.shutdown` has fired, the server has drained and the
/// rotation loop has finished any pass it was in.
pub async fn serve(listener: TcpListener, state: Arc<RelayState>) -> anyhow::Result<()> {
    let rotation = state.scheduler.clone().map(|scheduler| {
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    });

    let shutdown = state.shutdown.clone();
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;

    if let Some(task) = rotation {
        if let Err(e) = task.await {
            tracing::error!(err = %e, "rotation task failed");
        }
    }
    served.context("serving relay")
}
