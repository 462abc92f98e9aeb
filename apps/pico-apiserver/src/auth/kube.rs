// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Kubernetes TokenReview client.
//!
//! Posts `authentication.k8s.io/v1` TokenReview objects to the cluster API
//! server. The client authenticates with the pod's own service account
//! token, which kubelet rotates on disk, so the credential is re-read from
//! the file once its cached copy is older than [`CREDENTIAL_RELOAD_INTERVAL`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use super::error::ReviewError;
use super::verifier::{ReviewFuture, TokenReviewStatus, TokenReviewer};
use crate::config::ServerConfig;

/// Path of the TokenReview collection relative to the API server root.
const TOKEN_REVIEW_PATH: &str = "apis/authentication.k8s.io/v1/tokenreviews";

const API_VERSION: &str = "authentication.k8s.io/v1";
const KIND: &str = "TokenReview";

/// How long a credential read from disk is reused.
pub const CREDENTIAL_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenReviewRequest<'a> {
    api_version: &'static str,
    kind: &'static str,
    spec: TokenReviewSpec<'a>,
}

#[derive(Serialize)]
struct TokenReviewSpec<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct TokenReviewResponse {
    #[serde(default)]
    status: TokenReviewStatus,
}

struct CachedCredential {
    token: String,
    loaded_at: Instant,
}

/// Where the client's own bearer credential comes from.
enum Credential {
    Static(String),
    File {
        path: PathBuf,
        reload_after: Duration,
        cache: RwLock<Option<CachedCredential>>,
    },
}

impl Credential {
    fn file(path: PathBuf, reload_after: Duration) -> Self {
        Credential::File {
            path,
            reload_after,
            cache: RwLock::new(None),
        }
    }

    async fn current(&self) -> Result<String, ReviewError> {
        let (path, reload_after, cache) = match self {
            Credential::Static(token) => return Ok(token.clone()),
            Credential::File {
                path,
                reload_after,
                cache,
            } => (path, *reload_after, cache),
        };

        {
            let cached = cache.read().await;
            if let Some(entry) = &*cached {
                if entry.loaded_at.elapsed() < reload_after {
                    return Ok(entry.token.clone());
                }
            }
        }

        let token = read_credential(path).await?;
        let mut cached = cache.write().await;
        *cached = Some(CachedCredential {
            token: token.clone(),
            loaded_at: Instant::now(),
        });
        Ok(token)
    }
}

async fn read_credential(path: &Path) -> Result<String, ReviewError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        ReviewError::Setup(format!(
            "failed to read service account token {}: {e}",
            path.display()
        ))
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(ReviewError::Setup(format!(
            "service account token {} is empty",
            path.display()
        )));
    }
    Ok(token.to_string())
}

/// TokenReview client for a Kubernetes API server.
#[derive(Clone)]
pub struct KubeTokenReviewer {
    endpoint: Url,
    credential: Arc<Credential>,
    client: reqwest::Client,
}

impl KubeTokenReviewer {
    /// Create a client that authenticates with a fixed bearer credential.
    ///
    /// # Arguments
    /// - `api_url`: API server root (e.g. `https://10.0.0.1:443`)
    /// - `credential`: bearer token the client presents to the API server
    /// - `ca_pem`: PEM bundle trusted for the API server certificate
    /// - `timeout`: deadline for each review
    pub fn new(
        api_url: &Url,
        credential: impl Into<String>,
        ca_pem: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Self, ReviewError> {
        Self::build(
            api_url,
            Credential::Static(credential.into()),
            ca_pem,
            timeout,
        )
    }

    /// Create the in-cluster client described by the server configuration.
    ///
    /// Reads the cluster CA bundle eagerly so a broken mount fails at
    /// startup; the service account token is read lazily and reloaded.
    pub fn in_cluster(config: &ServerConfig) -> Result<Self, ReviewError> {
        let ca_pem = std::fs::read(&config.kube_ca_path).map_err(|e| {
            ReviewError::Setup(format!(
                "failed to read cluster CA {}: {e}",
                config.kube_ca_path.display()
            ))
        })?;

        Self::build(
            &config.kube_api_url,
            Credential::file(config.kube_token_path.clone(), CREDENTIAL_RELOAD_INTERVAL),
            Some(&ca_pem),
            config.review_timeout,
        )
    }

    fn build(
        api_url: &Url,
        credential: Credential,
        ca_pem: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Self, ReviewError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(pem) = ca_pem {
            let certs = reqwest::Certificate::from_pem_bundle(pem)
                .map_err(|e| ReviewError::Setup(format!("invalid cluster CA bundle: {e}")))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder
            .build()
            .map_err(|e| ReviewError::Setup(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: token_review_endpoint(api_url)?,
            credential: Arc::new(credential),
            client,
        })
    }

    /// Get the TokenReview endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn create_token_review(&self, token: &str) -> Result<TokenReviewStatus, ReviewError> {
        let credential = self.credential.current().await?;
        let request = TokenReviewRequest {
            api_version: API_VERSION,
            kind: KIND,
            spec: TokenReviewSpec { token },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReviewError::Transport(error_chain(&e.without_url())))?;

        if !response.status().is_success() {
            return Err(ReviewError::Status {
                status: response.status().as_u16(),
            });
        }

        let review: TokenReviewResponse = response
            .json()
            .await
            .map_err(|e| ReviewError::Decode(error_chain(&e.without_url())))?;

        Ok(review.status)
    }
}

impl TokenReviewer for KubeTokenReviewer {
    fn review<'a>(&'a self, token: &'a str) -> ReviewFuture<'a> {
        Box::pin(self.create_token_review(token))
    }
}

/// Render an error with every `source()` below it, joined by `": "`.
///
/// reqwest's own `Display` stops at the top level, which hides the TLS or
/// connect failure that actually caused a transport error.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn token_review_endpoint(api_url: &Url) -> Result<Url, ReviewError> {
    let mut base = api_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(TOKEN_REVIEW_PATH)
        .map_err(|e| ReviewError::Setup(format!("invalid API server URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> KubeTokenReviewer {
        let url: Url = server.uri().parse().unwrap();
        KubeTokenReviewer::new(&url, "sa-credential", None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_is_joined_to_api_root() {
        let url: Url = "https://10.0.0.1:443".parse().unwrap();
        assert_eq!(
            token_review_endpoint(&url).unwrap().as_str(),
            "https://10.0.0.1/apis/authentication.k8s.io/v1/tokenreviews"
        );

        let proxied: Url = "https://proxy.local/cluster-a".parse().unwrap();
        assert_eq!(
            token_review_endpoint(&proxied).unwrap().as_str(),
            "https://proxy.local/cluster-a/apis/authentication.k8s.io/v1/tokenreviews"
        );
    }

    #[tokio::test]
    async fn posts_token_review_and_parses_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/apis/authentication.k8s.io/v1/tokenreviews"))
            .and(header("Authorization", "Bearer sa-credential"))
            .and(body_partial_json(json!({
                "apiVersion": "authentication.k8s.io/v1",
                "kind": "TokenReview",
                "spec": { "token": "caller-token" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "apiVersion": "authentication.k8s.io/v1",
                "kind": "TokenReview",
                "status": {
                    "authenticated": true,
                    "user": {
                        "username": "system:serviceaccount:pico-system:pico-apiserver",
                        "uid": "0b9c-11",
                        "groups": ["system:serviceaccounts", "system:authenticated"]
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let status = client_for(&server).review("caller-token").await.unwrap();
        assert!(status.authenticated);
        assert_eq!(
            status.user.username,
            "system:serviceaccount:pico-system:pico-apiserver"
        );
        assert_eq!(status.user.uid.as_deref(), Some("0b9c-11"));
        assert_eq!(status.user.groups.len(), 2);
    }

    #[tokio::test]
    async fn unauthenticated_review_carries_reason() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "kind": "TokenReview",
                "status": { "authenticated": false, "error": "token has expired" }
            })))
            .mount(&server)
            .await;

        let status = client_for(&server).review("expired").await.unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.error.as_deref(), Some("token has expired"));
        assert!(status.user.username.is_empty());
    }

    #[tokio::test]
    async fn missing_status_means_unauthenticated() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "kind": "TokenReview"
            })))
            .mount(&server)
            .await;

        let status = client_for(&server).review("whatever").await.unwrap();
        assert!(!status.authenticated);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "kind": "Status",
                "message": "tokenreviews.authentication.k8s.io is forbidden"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).review("t").await.unwrap_err();
        assert!(matches!(err, ReviewError::Status { status: 403 }));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).review("t").await.unwrap_err();
        assert!(matches!(err, ReviewError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let url: Url = "http://127.0.0.1:9".parse().unwrap();
        let client =
            KubeTokenReviewer::new(&url, "sa-credential", None, Duration::from_secs(2)).unwrap();
        let err = client.review("t").await.unwrap_err();
        assert!(matches!(err, ReviewError::Transport(_)));
    }

    #[tokio::test]
    async fn file_credential_is_read_and_trimmed() {
        let dir = tempfile::TempDir::new().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "from-file\n").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer from-file"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": { "authenticated": false }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let url: Url = server.uri().parse().unwrap();
        let client = KubeTokenReviewer::build(
            &url,
            Credential::file(token_path, CREDENTIAL_RELOAD_INTERVAL),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        client.review("a").await.unwrap();
        client.review("b").await.unwrap();
    }

    #[tokio::test]
    async fn missing_credential_file_is_a_setup_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let url: Url = "http://127.0.0.1:9".parse().unwrap();
        let client = KubeTokenReviewer::build(
            &url,
            Credential::file(dir.path().join("absent"), CREDENTIAL_RELOAD_INTERVAL),
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client.review("t").await.unwrap_err();
        assert!(matches!(err, ReviewError::Setup(_)));
    }

    #[derive(Debug)]
    struct Wrapped(&'static str, Option<Box<Wrapped>>);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.1.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
        }
    }

    #[test]
    fn error_chain_includes_every_source() {
        let err = Wrapped(
            "error sending request",
            Some(Box::new(Wrapped(
                "client error (Connect)",
                Some(Box::new(Wrapped("connection refused", None))),
            ))),
        );
        assert_eq!(
            error_chain(&err),
            "error sending request: client error (Connect): connection refused"
        );
        assert_eq!(error_chain(&Wrapped("alone", None)), "alone");
    }

    #[tokio::test]
    async fn transport_error_keeps_underlying_cause() {
        let url: Url = "http://127.0.0.1:9".parse().unwrap();
        let client = KubeTokenReviewer::new(&url, "sa", None, Duration::from_secs(1)).unwrap();

        match client.review("t").await.unwrap_err() {
            ReviewError::Transport(message) => assert!(message.contains(": "), "{message}"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    async fn mount_for_credential(server: &MockServer, credential: &str) {
        Mock::given(method("POST"))
            .and(header("Authorization", format!("Bearer {credential}").as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": { "authenticated": false }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn rotated_credential_is_picked_up_after_reload_interval() {
        let dir = tempfile::TempDir::new().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "first\n").unwrap();

        let server = MockServer::start().await;
        mount_for_credential(&server, "first").await;
        mount_for_credential(&server, "second").await;

        let url: Url = server.uri().parse().unwrap();
        let client = KubeTokenReviewer::build(
            &url,
            Credential::file(token_path.clone(), Duration::ZERO),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        client.review("a").await.unwrap();
        std::fs::write(&token_path, "second\n").unwrap();
        client.review("b").await.unwrap();
    }

    #[tokio::test]
    async fn cached_credential_is_kept_within_reload_interval() {
        let dir = tempfile::TempDir::new().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "first").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer first"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": { "authenticated": false }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let url: Url = server.uri().parse().unwrap();
        let client = KubeTokenReviewer::build(
            &url,
            Credential::file(token_path.clone(), Duration::from_secs(3600)),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        client.review("a").await.unwrap();
        std::fs::write(&token_path, "second").unwrap();
        client.review("b").await.unwrap();
    }
}
