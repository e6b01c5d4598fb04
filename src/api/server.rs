// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP server configuration

use std::time::Duration;

use super::errors::ErrorStatusPolicy;

/// Largest accepted request body
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_addr: String,
    /// Upper bound on one request, end to end
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    pub error_status_policy: ErrorStatusPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            request_timeout: Duration::from_secs(120),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            error_status_policy: ErrorStatusPolicy::default(),
        }
    }
}
