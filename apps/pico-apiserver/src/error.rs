// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Canonical JSON error responses.
//!
//! Every error the server writes to a client has the shape
//! `{"code": "<CODE>", "message": "<human message>"}` and is served as
//! `application/json`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Error code for credentials that are missing, malformed, or rejected.
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";

/// Error code for authenticated callers outside the allow-list.
pub const FORBIDDEN: &str = "FORBIDDEN";

#[derive(Debug)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

/// Wire format of an error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. `UNAUTHORIZED`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, FORBIDDEN, message)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Build the canonical error response.
///
/// The returned response is terminal: callers must not attach further body
/// content to it.
pub fn respond_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    ErrorResponse::new(status, code, message).into_response()
}
