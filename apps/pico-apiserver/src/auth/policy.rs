// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Pico Authors

//! Service account allow-list.
//!
//! Kubernetes reports service account identities as
//! `system:serviceaccount:<namespace>:<name>`. Only the `pico-apiserver`
//! account is allowed, either in the configured namespace or in the legacy
//! `pico` namespace.
//!
//! Matching is by prefix: `system:serviceaccount:<ns>:pico-apiserver-canary`
//! is accepted too. Comparison is byte-exact and case-sensitive.

/// Username prefix shared by every service account identity.
pub const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Name of the service account allowed to call the API.
pub const ALLOWED_SERVICE_ACCOUNT: &str = "pico-apiserver";

/// Identity accepted regardless of the configured namespace.
pub const LEGACY_ALLOWED_PREFIX: &str = "system:serviceaccount:pico:pico-apiserver";

/// Allow-list prefix for a service account in the given namespace.
pub fn service_account_prefix(namespace: &str) -> String {
    format!("{SERVICE_ACCOUNT_PREFIX}{namespace}:{ALLOWED_SERVICE_ACCOUNT}")
}

/// Check whether a proven identity may call the API.
pub fn is_authorized(username: &str, namespace: &str) -> bool {
    if username.is_empty() {
        return false;
    }

    username.starts_with(&service_account_prefix(namespace))
        || username.starts_with(LEGACY_ALLOWED_PREFIX)
}
