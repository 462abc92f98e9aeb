// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! # Authentication Module
//!
//! Service account token authentication for the pico API server.
//!
//! ## Auth Flow
//!
//! 1. A workload mounts its projected service account token
//! 2. It sends `Authorization: Bearer <token>`
//! 3. The API server:
//!    - Posts a TokenReview to the Kubernetes API server
//!    - Takes the proven username (`system:serviceaccount:<ns>:<name>`)
//!    - Allows only the `pico-apiserver` account in the configured namespace
//!      or in the legacy `pico` namespace
//!
//! ## Security
//!
//! - Every protected request triggers a fresh review (no result caching)
//! - Tokens are never logged or echoed back
//! - Client-facing errors are coarse; details go to the server log
//! - `PICO_DISABLE_AUTH` bypasses everything and is for development only

pub mod error;
pub mod extractor;
pub mod kube;
pub mod middleware;
pub mod policy;
pub mod verifier;

pub use error::{AuthError, ReviewError};
pub use extractor::{Caller, ServiceAccountIdentity};
pub use kube::KubeTokenReviewer;
pub use middleware::{auth_middleware, require_service_account};
pub use policy::is_authorized;
pub use verifier::{
    validate, TokenReviewStatus, TokenReviewer, Unconfigured, UserInfo, Verification,
};
