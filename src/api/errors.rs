// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for the detection pipeline and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use super::detect::response::cors_headers;

/// Body of every failed request: `{"error": "<message>"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failure kinds a request can end in.
///
/// Pipeline stages return these directly and stay unaware of HTTP;
/// the status code is picked at the transport boundary through
/// [`ErrorStatusPolicy`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// No image-typed part could be found in the upload body
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    /// The extracted bytes are not a decodable image
    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    /// Weights missing/unfetchable or model construction failed
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The annotated image could not be serialized
    #[error("Failed to encode response: {0}")]
    EncodeError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// Short machine-friendly name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MalformedUpload(_) => "malformed_upload",
            ApiError::DecodeError(_) => "decode_error",
            ApiError::ModelUnavailable(_) => "model_unavailable",
            ApiError::EncodeError(_) => "encode_error",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    /// Status code under the per-kind mapping
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::MalformedUpload(_) => 400,
            ApiError::DecodeError(_) => 422,
            ApiError::ModelUnavailable(_) => 503,
            ApiError::EncodeError(_) | ApiError::InternalError(_) => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
        }
    }

    /// Build the HTTP response for this error under `policy`
    pub fn into_http_response(self, policy: ErrorStatusPolicy) -> Response {
        let status = policy.status_for(&self);
        (status, cors_headers(), Json(self.to_response())).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{:#}", err))
    }
}

/// How failures are surfaced on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStatusPolicy {
    /// Every failure becomes 500; callers tell kinds apart by message only
    #[default]
    Uniform,
    /// Each kind gets its own status (see [`ApiError::status_code`])
    PerKind,
}

impl ErrorStatusPolicy {
    pub fn status_for(&self, error: &ApiError) -> StatusCode {
        match self {
            ErrorStatusPolicy::Uniform => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorStatusPolicy::PerKind => StatusCode::from_u16(error.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl FromStr for ErrorStatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" => Ok(ErrorStatusPolicy::Uniform),
            "per-kind" | "per_kind" | "perkind" => Ok(ErrorStatusPolicy::PerKind),
            other => Err(format!(
                "unknown error status policy '{}', expected 'uniform' or 'per-kind'",
                other
            )),
        }
    }
}

// Errors raised outside a request's policy context (e.g. extractor rejections)
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_http_response(ErrorStatusPolicy::Uniform)
    }
}
