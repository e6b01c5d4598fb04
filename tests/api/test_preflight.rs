// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OPTIONS /api/detect and CORS headers

use super::support::*;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};

#[cfg(test)]
mod preflight_tests {
    use super::*;

    /// Test 1: A bare OPTIONS request gets 200, CORS headers and no body
    #[tokio::test]
    async fn test_options_returns_empty_ok() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/detect")
            .body(Body::empty())
            .unwrap();

        let (status, headers, body) = send(app(FakeModels::working(vec![])), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_cors(&headers);
    }

    /// Test 2: A browser preflight is answered without running the pipeline
    #[tokio::test]
    async fn test_browser_preflight() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/detect")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let (status, headers, body) = send(app(FakeModels::new(None, None)), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        let allowed = headers
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap()
            .to_uppercase();
        assert!(allowed.contains("POST"));
        let allowed_headers = headers
            .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
            .unwrap()
            .to_str()
            .unwrap()
            .to_lowercase();
        assert!(allowed_headers.contains("content-type"));
    }

    /// Test 3: Cross-origin POST responses carry a single allow-origin value
    #[tokio::test]
    async fn test_cross_origin_post_has_single_origin_header() {
        let mut request = detect_request(image_upload(&png(24, 24)));
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

        let (status, headers, _) = send(app(FakeModels::working(vec!["a"])), request).await;

        assert_eq!(status, StatusCode::OK);
        let origins: Vec<_> = headers.get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN).iter().collect();
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0], "*");
    }

    /// Test 4: Error responses to cross-origin requests are still readable
    #[tokio::test]
    async fn test_cross_origin_error_has_cors() {
        let mut request = detect_request(multipart("note", None, "text/plain", b"x"));
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

        let (status, headers, _) = send(app(FakeModels::working(vec![])), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }
}
