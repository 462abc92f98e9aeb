// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Token verification against a token review service.
//!
//! The middleware never talks to the cluster directly. It goes through the
//! [`TokenReviewer`] capability so tests can substitute a fake and the
//! concrete Kubernetes client stays out of the middleware type.
//!
//! Each call performs a fresh review: results are neither cached nor retried.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::error::ReviewError;

/// Boxed future returned by [`TokenReviewer::review`].
pub type ReviewFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TokenReviewStatus, ReviewError>> + Send + 'a>>;

/// Identity the review service attached to a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Outcome of a token review (the `status` of a TokenReview).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenReviewStatus {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: UserInfo,
    /// Reason the service gave for not authenticating, if any.
    #[serde(default)]
    pub error: Option<String>,
}

impl TokenReviewStatus {
    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            user: UserInfo {
                username: username.into(),
                ..UserInfo::default()
            },
            error: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::default()
    }
}

/// A service able to tell whether a bearer token is valid right now.
///
/// Implementations must be safe for concurrent use; the middleware shares a
/// single instance across all in-flight requests.
pub trait TokenReviewer: Send + Sync {
    /// Review an opaque token.
    fn review<'a>(&'a self, token: &'a str) -> ReviewFuture<'a>;
}

/// Reviewer for servers started without an identity service.
///
/// Fails every review, so a misconfigured server rejects rather than admits.
pub struct Unconfigured;

impl TokenReviewer for Unconfigured {
    fn review<'a>(&'a self, _token: &'a str) -> ReviewFuture<'a> {
        Box::pin(async {
            Err(ReviewError::Setup(
                "token review is not configured".to_string(),
            ))
        })
    }
}

/// Verdict of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The token proves this identity.
    Authenticated(String),
    /// The token is invalid, expired, or carries no identity.
    Unauthenticated,
}

/// Ask the review service whether `token` is valid.
///
/// The review races against `cancel`; a cancelled request yields
/// [`ReviewError::Cancelled`]. An authenticated result without a username is
/// reported as [`Verification::Unauthenticated`].
pub async fn validate(
    reviewer: &dyn TokenReviewer,
    cancel: &CancellationToken,
    token: &str,
) -> Result<Verification, ReviewError> {
    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ReviewError::Cancelled),
        result = reviewer.review(token) => result?,
    };

    if !status.authenticated {
        if let Some(reason) = status.error.as_deref() {
            tracing::debug!(reason, "token review rejected token");
        }
        return Ok(Verification::Unauthenticated);
    }

    if status.user.username.is_empty() {
        tracing::warn!("token review authenticated a token without a username");
        return Ok(Verification::Unauthenticated);
    }

    Ok(Verification::Authenticated(status.user.username))
}
