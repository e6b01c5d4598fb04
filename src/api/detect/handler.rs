// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection endpoint handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::request::boundary_from_content_type;
use super::response::cors_headers;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;

/// POST /api/detect - Annotate an uploaded image and read its text
///
/// Accepts a `multipart/form-data` body with one image part (the browser
/// client names it `image`). Runs object detection and OCR on a bounded
/// copy of the image.
///
/// # Response
/// - `image`: Base64 JPEG of the image with detections drawn on it
/// - `text`: Recognized text fragments, one per line
///
/// # Errors
/// `{"error": "<message>"}`, status per the configured error policy
/// (500 for every failure by default). A request that outlives
/// `ApiConfig::request_timeout` fails the same way.
pub async fn detect_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("detect", %request_id);

    async move {
        let boundary = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(boundary_from_content_type);
        debug!("Detect request received: {} bytes, boundary: {:?}", body.len(), boundary);

        let started = Instant::now();
        let timeout = state.config.request_timeout;
        let outcome = match tokio::time::timeout(timeout, state.pipeline.run(body, boundary)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiError::InternalError(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(document) => {
                info!(
                    "Detect request complete: {} chars of text, {}ms",
                    document.text.len(),
                    started.elapsed().as_millis()
                );
                (StatusCode::OK, cors_headers(), Json(document)).into_response()
            }
            Err(error) => {
                warn!("Detect request failed after {}ms: {}", started.elapsed().as_millis(), error);
                error.into_http_response(state.config.error_status_policy)
            }
        }
    }
    .instrument(span)
    .await
}
