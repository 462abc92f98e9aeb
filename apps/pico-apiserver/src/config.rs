// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and shared
//! read-only for the lifetime of the process.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PICO_NAMESPACE` | Deployment namespace used for the allow-list | `POD_NAMESPACE`, then the in-cluster namespace file |
//! | `PICO_DISABLE_AUTH` | Skip all authentication (development only) | `false` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `PICO_KUBE_API_URL` | Kubernetes API server URL | from `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` |
//! | `PICO_KUBE_TOKEN_PATH` | Service account token used to call TokenReview | `/var/run/secrets/kubernetes.io/serviceaccount/token` |
//! | `PICO_KUBE_CA_PATH` | Cluster CA bundle | `/var/run/secrets/kubernetes.io/serviceaccount/ca.crt` |
//! | `PICO_REVIEW_TIMEOUT_SECS` | Deadline for each token review | `10` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

pub const NAMESPACE_ENV: &str = "PICO_NAMESPACE";
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";
pub const DISABLE_AUTH_ENV: &str = "PICO_DISABLE_AUTH";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const KUBE_API_URL_ENV: &str = "PICO_KUBE_API_URL";
pub const KUBE_TOKEN_PATH_ENV: &str = "PICO_KUBE_TOKEN_PATH";
pub const KUBE_CA_PATH_ENV: &str = "PICO_KUBE_CA_PATH";
pub const REVIEW_TIMEOUT_ENV: &str = "PICO_REVIEW_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Set by kubelet in every pod.
pub const KUBERNETES_SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
pub const KUBERNETES_SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Projected service account volume.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REVIEW_TIMEOUT: Duration = Duration::from_secs(10);

/// Used when neither `PICO_KUBE_API_URL` nor the kubelet variables are set.
pub const DEFAULT_KUBE_API_URL: &str = "https://kubernetes.default.svc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("namespace is not configured (set {NAMESPACE_ENV})")]
    MissingNamespace,
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deployment namespace; selects the primary allow-list prefix.
    pub namespace: String,
    /// Development escape hatch: forward every request unchecked.
    pub disable_auth: bool,
    pub host: String,
    pub port: u16,
    pub kube_api_url: Url,
    pub kube_token_path: PathBuf,
    pub kube_ca_path: PathBuf,
    pub review_timeout: Duration,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Configuration for the given namespace with every other field defaulted.
    pub fn new(namespace: impl Into<String>) -> Self {
        let sa_dir = Path::new(SERVICE_ACCOUNT_DIR);
        Self {
            namespace: namespace.into(),
            disable_auth: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            kube_api_url: Url::parse(DEFAULT_KUBE_API_URL).expect("default API URL is valid"),
            kube_token_path: sa_dir.join("token"),
            kube_ca_path: sa_dir.join("ca.crt"),
            review_timeout: DEFAULT_REVIEW_TIMEOUT,
            log_format: LogFormat::Pretty,
        }
    }

    pub fn with_disable_auth(mut self, disable_auth: bool) -> Self {
        self.disable_auth = disable_auth;
        self
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let namespace = get(NAMESPACE_ENV)
            .or_else(|| get(POD_NAMESPACE_ENV))
            .or_else(|| read_namespace_file(&Path::new(SERVICE_ACCOUNT_DIR).join("namespace")))
            .map(|ns| ns.trim().to_string())
            .ok_or(ConfigError::MissingNamespace)?;

        let mut config = Self::new(namespace);

        if let Some(value) = get(DISABLE_AUTH_ENV) {
            config.disable_auth = parse_bool(&value)
                .ok_or_else(|| ConfigError::invalid(DISABLE_AUTH_ENV, &value, "expected a boolean"))?;
        }

        if let Some(host) = get(HOST_ENV) {
            config.host = host;
        }

        if let Some(value) = get(PORT_ENV) {
            config.port = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(PORT_ENV, &value, format!("{e}")))?;
        }

        if let Some(value) = get(KUBE_API_URL_ENV) {
            config.kube_api_url = Url::parse(value.trim())
                .map_err(|e| ConfigError::invalid(KUBE_API_URL_ENV, &value, format!("{e}")))?;
        } else if let Some(host) = get(KUBERNETES_SERVICE_HOST_ENV) {
            let port = get(KUBERNETES_SERVICE_PORT_ENV).unwrap_or_else(|| "443".to_string());
            let raw = kubernetes_service_url(host.trim(), port.trim());
            config.kube_api_url = Url::parse(&raw).map_err(|e| {
                ConfigError::invalid(KUBERNETES_SERVICE_HOST_ENV, &host, format!("{e}"))
            })?;
        }

        if let Some(path) = get(KUBE_TOKEN_PATH_ENV) {
            config.kube_token_path = PathBuf::from(path);
        }

        if let Some(path) = get(KUBE_CA_PATH_ENV) {
            config.kube_ca_path = PathBuf::from(path);
        }

        if let Some(value) = get(REVIEW_TIMEOUT_ENV) {
            let secs: u64 = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(REVIEW_TIMEOUT_ENV, &value, format!("{e}")))?;
            if secs == 0 {
                return Err(ConfigError::invalid(
                    REVIEW_TIMEOUT_ENV,
                    &value,
                    "must be greater than zero",
                ));
            }
            config.review_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = get(LOG_FORMAT_ENV) {
            config.log_format = LogFormat::parse(&value).ok_or_else(|| {
                ConfigError::invalid(LOG_FORMAT_ENV, &value, "expected `json` or `pretty`")
            })?;
        }

        Ok(config)
    }

    /// Socket address string to bind.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn read_namespace_file(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
}

fn kubernetes_service_url(host: &str, port: &str) -> String {
    // IPv6 service addresses need brackets.
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
