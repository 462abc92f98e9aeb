// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

use std::sync::Arc;

use pico_apiserver::{
    api::router,
    auth::{KubeTokenReviewer, TokenReviewer, Unconfigured},
    config::ServerConfig,
    state::AppState,
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().expect("Failed to load configuration");
    init_tracing(config.log_format);

    let reviewer: Arc<dyn TokenReviewer> = match KubeTokenReviewer::in_cluster(&config) {
        Ok(client) => {
            tracing::info!(endpoint = %client.endpoint(), "using Kubernetes TokenReview API");
            Arc::new(client)
        }
        Err(e) if config.disable_auth => {
            tracing::warn!(error = %e, "TokenReview client unavailable; authentication is disabled");
            Arc::new(Unconfigured)
        }
        Err(e) => panic!("Failed to create TokenReview client: {e}"),
    };

    if config.disable_auth {
        tracing::warn!("authentication is DISABLED - every request will be allowed (development only)");
    }

    let shutdown = CancellationToken::new();
    let addr = config.bind_address();
    let namespace = config.namespace.clone();
    let state = AppState::new(config, reviewer).with_shutdown(shutdown.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    tracing::info!(%addr, %namespace, "pico-apiserver listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("HTTP server failed");
}

/// Resolve on Ctrl-C or SIGTERM, cancelling in-flight token reviews.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
