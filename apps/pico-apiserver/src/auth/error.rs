// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::{respond_error, FORBIDDEN, UNAUTHORIZED};

/// Reasons the middleware rejects a request.
///
/// Client-facing messages are deliberately coarse. Diagnostic detail about
/// review failures goes to the server log, never into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header present but not `Bearer <token>`
    InvalidAuthHeader,
    /// The TokenReview call itself failed
    ValidationFailed,
    /// The identity service rejected the token
    InvalidToken,
    /// Authenticated, but not an allowed service account
    ServiceAccountNotAuthorized,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::ServiceAccountNotAuthorized => FORBIDDEN,
            _ => UNAUTHORIZED,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::ValidationFailed
            | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::ServiceAccountNotAuthorized => StatusCode::FORBIDDEN,
        }
    }

    /// Message returned to the client.
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "Missing authorization header",
            AuthError::InvalidAuthHeader => "Invalid authorization header format",
            AuthError::ValidationFailed => "Token validation failed",
            AuthError::InvalidToken => "Invalid or expired token",
            AuthError::ServiceAccountNotAuthorized => "Service account not authorized",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        respond_error(self.status_code(), self.error_code(), self.message())
    }
}

/// Failure to obtain a verdict from the identity service.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// Building the client failed (bad CA bundle, unreadable token file).
    #[error("token review client setup failed: {0}")]
    Setup(String),
    /// Network or TLS failure talking to the API server.
    #[error("failed to review token: {0}")]
    Transport(String),
    /// The API server answered with a non-success status.
    #[error("failed to review token: HTTP {status}")]
    Status { status: u16 },
    /// The response body was not a TokenReview.
    #[error("failed to decode token review response: {0}")]
    Decode(String),
    /// The request was cancelled before the review completed.
    #[error("token review cancelled")]
    Cancelled,
}
