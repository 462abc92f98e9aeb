// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Service account authentication middleware for Axum.
//!
//! Every protected request goes through [`auth_middleware`]:
//!
//! 1. If authentication is disabled, the request is forwarded with a warning.
//! 2. The `Authorization` header must be `Bearer <token>` (scheme is
//!    case-sensitive, split on the first space only).
//! 3. The token is reviewed by the configured [`TokenReviewer`].
//! 4. The proven identity must pass the service account allow-list.
//!
//! On success the [`ServiceAccountIdentity`] is added to the request
//! extensions. Every failure is answered once with a JSON error and the
//! wrapped handler is not called. The token itself is never logged.
//!
//! [`TokenReviewer`]: super::TokenReviewer

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};

use super::policy::is_authorized;
use super::verifier::{validate, Verification};
use super::{AuthError, ServiceAccountIdentity};
use crate::state::AppState;

/// Authentication scheme accepted in the `Authorization` header.
pub const BEARER_SCHEME: &str = "Bearer";

/// Wrap every route of `router` with [`auth_middleware`].
///
/// Routes must be added before calling this; routes added afterwards are not
/// protected.
///
/// ```rust,ignore
/// let protected = Router::new().route("/whoami", get(whoami));
/// let app = require_service_account(protected, state.clone()).with_state(state);
/// ```
pub fn require_service_account<S>(router: Router<S>, state: AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(axum::middleware::from_fn_with_state(state, auth_middleware))
}

/// Authentication middleware function.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.config.disable_auth {
        tracing::warn!("authentication is disabled - allowing unauthenticated request");
        return next.run(request).await;
    }

    let identity = match authenticate(&state, request.headers()).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<ServiceAccountIdentity, AuthError> {
    let token = bearer_token(headers)?;

    let cancel = state.shutdown.child_token();
    let username = match validate(state.reviewer.as_ref(), &cancel, token).await {
        Ok(Verification::Authenticated(username)) => username,
        Ok(Verification::Unauthenticated) => return Err(AuthError::InvalidToken),
        Err(e) => {
            tracing::error!(error = %e, "token validation error");
            return Err(AuthError::ValidationFailed);
        }
    };

    if !is_authorized(&username, &state.config.namespace) {
        tracing::warn!(service_account = %username, "unauthorized service account");
        return Err(AuthError::ServiceAccountNotAuthorized);
    }

    tracing::info!(service_account = %username, "authenticated request from service account");
    Ok(ServiceAccountIdentity::new(username))
}

/// Extract the bearer token from the request headers.
///
/// The header is split on the first ASCII space into at most two parts. The
/// token is returned exactly as sent, so `Bearer  xyz` yields `" xyz"`.
/// Non-ASCII UTF-8 tokens are forwarded to the reviewer like any other.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = match headers.get(AUTHORIZATION) {
        Some(value) if !value.is_empty() => value.as_bytes(),
        _ => return Err(AuthError::MissingAuthHeader),
    };

    let mut parts = value.splitn(2, |b| *b == b' ');
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme == BEARER_SCHEME.as_bytes() => {
            // A token that is not UTF-8 cannot be put in a TokenReview body.
            std::str::from_utf8(token).map_err(|_| AuthError::InvalidAuthHeader)
        }
        _ => Err(AuthError::InvalidAuthHeader),
    }
}
