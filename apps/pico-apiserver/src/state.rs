// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::TokenReviewer;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub reviewer: Arc<dyn TokenReviewer>,
    /// Cancelled on shutdown; each request reviews under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, reviewer: Arc<dyn TokenReviewer>) -> Self {
        Self {
            config: Arc::new(config),
            reviewer,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
