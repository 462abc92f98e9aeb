// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! pico-apiserver - Service Account Authentication Gateway
//!
//! Gates the pico API server so that only the `pico-apiserver` Kubernetes
//! service account can reach protected handlers. Tokens are verified through
//! the Kubernetes TokenReview API on every request.
//!
//! ## Modules
//!
//! - `api` - HTTP router and health endpoints (Axum)
//! - `auth` - Bearer token middleware, TokenReview client, allow-list
//! - `config` - Environment configuration
//! - `error` - Canonical JSON error responses
//! - `telemetry` - Tracing subscriber setup

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod telemetry;
