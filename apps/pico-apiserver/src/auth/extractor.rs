// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Proven caller identity for protected handlers.
//!
//! The auth middleware inserts a [`ServiceAccountIdentity`] into the request
//! extensions once a token passes review and the allow-list. Handlers read it
//! with the [`Caller`] extractor:
//!
//! ```rust,ignore
//! async fn my_handler(Caller(identity): Caller) -> impl IntoResponse {
//!     // identity is None when authentication is disabled
//! }
//! ```

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use utoipa::ToSchema;

use super::policy::SERVICE_ACCOUNT_PREFIX;

/// Identity proven by a token review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ServiceAccountIdentity {
    /// Username exactly as reported by the identity service.
    pub username: String,
    /// Namespace component, when the username is a service account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Service account name component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ServiceAccountIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        let (namespace, name) = match username
            .strip_prefix(SERVICE_ACCOUNT_PREFIX)
            .and_then(|rest| rest.split_once(':'))
        {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
                (Some(ns.to_string()), Some(name.to_string()))
            }
            _ => (None, None),
        };

        Self {
            username,
            namespace,
            name,
        }
    }
}

/// Extractor for the authenticated caller, if any.
///
/// Yields `None` when the route is served with authentication disabled.
pub struct Caller(pub Option<ServiceAccountIdentity>);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(parts.extensions.get::<ServiceAccountIdentity>().cloned()))
    }
}
