// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{require_service_account, Caller},
    error::ErrorBody,
    state::AppState,
};

pub mod health;

/// Identity of the authenticated caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct WhoAmIResponse {
    /// Proven username, or `null` when authentication is disabled.
    pub username: Option<String>,
    /// Namespace of the calling service account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Name of the calling service account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

/// Report the identity the auth middleware proved for this request.
#[utoipa::path(
    get,
    path = "/v1/whoami",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller identity", body = WhoAmIResponse),
        (status = 401, description = "Missing, malformed, or rejected token", body = ErrorBody),
        (status = 403, description = "Service account not authorized", body = ErrorBody)
    )
)]
pub async fn whoami(Caller(identity): Caller) -> Json<WhoAmIResponse> {
    let response = match identity {
        Some(identity) => WhoAmIResponse {
            username: Some(identity.username),
            namespace: identity.namespace,
            service_account: identity.name,
        },
        None => WhoAmIResponse {
            username: None,
            namespace: None,
            service_account: None,
        },
    };
    Json(response)
}

/// Build the application router.
///
/// Health probes and API docs are public; everything under `/v1` requires a
/// service account token.
pub fn router(state: AppState) -> Router {
    let v1_routes = require_service_account(
        Router::new().route("/whoami", get(whoami)),
        state.clone(),
    );

    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .nest("/health", health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(health::liveness, health::readiness, whoami),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            WhoAmIResponse,
            ErrorBody
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Service account authentication")
    )
)]
struct ApiDoc;

struct BearerSecurity;

impl utoipa::Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::auth::verifier::testing::FakeReviewer;
    use crate::config::ServerConfig;

    fn app(reviewer: FakeReviewer, disable_auth: bool) -> (Router, Arc<FakeReviewer>) {
        let reviewer = Arc::new(reviewer);
        let config = ServerConfig::new("pico-system").with_disable_auth(disable_auth);
        let state = AppState::new(config, reviewer.clone());
        (router(state), reviewer)
    }

    async fn get_json(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (app, _) = app(FakeReviewer::unauthenticated(), false);
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, reviewer) = app(FakeReviewer::unauthenticated(), false);
        let (status, body) = get_json(app.clone(), "/health/live", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(app, "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth"], "enabled");
        assert_eq!(reviewer.calls(), 0);
    }

    #[tokio::test]
    async fn whoami_requires_token() {
        let (app, _) = app(FakeReviewer::unauthenticated(), false);
        let (status, body) = get_json(app, "/v1/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn whoami_reports_service_account() {
        let (app, _) = app(
            FakeReviewer::authenticated("system:serviceaccount:pico-system:pico-apiserver"),
            false,
        );
        let (status, body) = get_json(app, "/v1/whoami", Some("good")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["username"],
            "system:serviceaccount:pico-system:pico-apiserver"
        );
        assert_eq!(body["namespace"], "pico-system");
        assert_eq!(body["service_account"], "pico-apiserver");
    }

    #[tokio::test]
    async fn whoami_with_auth_disabled_has_no_identity() {
        let (app, reviewer) = app(FakeReviewer::unauthenticated(), true);
        let (status, body) = get_json(app, "/v1/whoami", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["username"].is_null());
        assert_eq!(reviewer.calls(), 0);
    }

    #[tokio::test]
    async fn openapi_document_is_public() {
        let (app, _) = app(FakeReviewer::unauthenticated(), false);
        let (status, body) = get_json(app, "/api-doc/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/v1/whoami"].is_object());
    }
}
