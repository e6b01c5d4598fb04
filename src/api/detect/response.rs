// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection response types and CORS headers

use axum::http::{header, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Successful result of one request: `{"image": ..., "text": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    /// Base64-encoded JPEG of the annotated image
    pub image: String,
    /// Recognized text fragments joined by newlines
    pub text: String,
}

/// Cross-origin headers attached to every response of the endpoint
pub fn cors_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ),
    ]
}
