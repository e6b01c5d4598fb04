// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! POST /api/detect end to end with fake models

use super::support::*;
use axum::http::{header, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use detect_ocr_node::api::ApiConfig;
use image::{GenericImageView, ImageFormat};
use std::sync::Arc;
use std::time::Duration;

fn decode_returned_image(value: &serde_json::Value) -> image::DynamicImage {
    let encoded = value["image"].as_str().expect("image is a string");
    let bytes = STANDARD.decode(encoded).expect("image is base64");
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    image::load_from_memory(&bytes).unwrap()
}

#[cfg(test)]
mod detect_endpoint_tests {
    use super::*;

    /// Test 1: A PNG upload yields an annotated JPEG and the joined text
    #[tokio::test]
    async fn test_png_upload_returns_image_and_text() {
        let app = app(FakeModels::working(vec!["STOP", "EXIT 12"]));
        let request = detect_request(image_upload(&png(320, 240)));

        let (status, headers, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_cors(&headers);
        assert!(headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/json"));

        let value = json(&body);
        assert_eq!(value["text"], "STOP\nEXIT 12");
        let returned = decode_returned_image(&value);
        assert_eq!(returned.dimensions(), (320, 240));

        // The marker painted by the detector survives encoding
        let corner = returned.to_rgb8().get_pixel(2, 2).0;
        assert!(corner.iter().all(|&c| c > 200), "corner was {:?}", corner);
    }

    /// Test 2: The response document has exactly the two documented fields
    #[tokio::test]
    async fn test_response_has_only_image_and_text() {
        let app = app(FakeModels::working(vec!["hello"]));
        let (_, _, body) = send(app, detect_request(image_upload(&png(64, 64)))).await;

        let value = json(&body);
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(value.get("image").is_some());
        assert!(value.get("text").is_some());
    }

    /// Test 3: Large uploads come back bounded to 1280x720
    #[tokio::test]
    async fn test_large_upload_is_downscaled() {
        let app = app(FakeModels::working(vec![]));
        let (status, _, body) = send(app, detect_request(image_upload(&png(1920, 1080)))).await;

        assert_eq!(status, StatusCode::OK);
        let returned = decode_returned_image(&json(&body));
        assert_eq!(returned.dimensions(), (1280, 720));
    }

    /// Test 4: Small uploads are never upscaled
    #[tokio::test]
    async fn test_small_upload_keeps_size() {
        let app = app(FakeModels::working(vec![]));
        let (_, _, body) = send(app, detect_request(image_upload(&png(17, 9)))).await;

        assert_eq!(decode_returned_image(&json(&body)).dimensions(), (17, 9));
    }

    /// Test 5: No recognized text gives an empty string, not an error
    #[tokio::test]
    async fn test_no_text_is_empty_string() {
        let app = app(FakeModels::working(vec![]));
        let (status, _, body) = send(app, detect_request(image_upload(&png(100, 50)))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["text"], "");
    }

    /// Test 6: JPEG uploads are accepted the same way
    #[tokio::test]
    async fn test_jpeg_upload() {
        let app = app(FakeModels::working(vec!["jpeg"]));
        let data = encoded_image(200, 100, ImageFormat::Jpeg);
        let body = multipart("image", Some("photo.jpg"), "image/jpeg", &data);

        let (status, _, body) = send(app, detect_request(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["text"], "jpeg");
    }

    /// Test 7: A body without an image part fails with an error document
    #[tokio::test]
    async fn test_missing_image_part() {
        let app = app(FakeModels::working(vec!["unused"]));
        let body = multipart("comment", None, "text/plain", b"just words");

        let (status, headers, body) = send(app, detect_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&headers);
        let value = json(&body);
        assert!(value["error"].as_str().unwrap().to_lowercase().contains("upload"));
        assert!(value.get("image").is_none());
    }

    /// Test 8: Garbage in the image part is a decode failure
    #[tokio::test]
    async fn test_undecodable_image() {
        let app = app(FakeModels::working(vec![]));
        let body = multipart("image", Some("photo.png"), "image/png", b"definitely not a png");

        let (status, _, body) = send(app, detect_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json(&body)["error"].as_str().unwrap().to_lowercase().contains("decode"));
    }

    /// Test 9: Detector failures surface as 500 with a message
    #[tokio::test]
    async fn test_detector_failure() {
        let models = FakeModels::new(
            Some(Arc::new(FailingDetector)),
            Some(Arc::new(FixedText(vec!["x"]))),
        );
        let (status, headers, body) = send(app(models), detect_request(image_upload(&png(32, 32)))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&headers);
        assert!(json(&body)["error"].as_str().unwrap().contains("tensor shape mismatch"));
    }

    /// Test 10: Missing weights fail the request without partial output
    #[tokio::test]
    async fn test_models_unavailable() {
        let models = FakeModels::new(None, None);
        let (status, _, body) = send(app(models), detect_request(image_upload(&png(32, 32)))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let value = json(&body);
        assert!(value["error"].as_str().unwrap().contains("unavailable"));
        assert!(value.get("text").is_none());
    }

    /// Test 11: Bodies over the 10 MiB limit are refused before the pipeline runs
    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let payload = vec![0u8; 10 * 1024 * 1024 + 1];
        let (status, _, _) = send(app(FakeModels::working(vec![])), detect_request(payload)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    /// Test 12: GET is not routed; OPTIONS is answered by the CORS layer
    #[tokio::test]
    async fn test_get_not_allowed() {
        let request = axum::http::Request::builder()
            .method(axum::http::Method::GET)
            .uri("/api/detect")
            .body(axum::body::Body::empty())
            .unwrap();

        let (status, _, _) = send(app(FakeModels::working(vec![])), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    /// Test 13: Without a Content-Type header the image is still found
    #[tokio::test]
    async fn test_missing_content_type_header() {
        let request = axum::http::Request::builder()
            .method(axum::http::Method::POST)
            .uri("/api/detect")
            .body(axum::body::Body::from(image_upload(&png(40, 30))))
            .unwrap();

        let (status, _, body) = send(app(FakeModels::working(vec!["loose"])), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["text"], "loose");
    }

    /// Test 14: A request that outlives the timeout gets the error document
    #[tokio::test]
    async fn test_timeout_returns_error_document() {
        let models = FakeModels::new(
            Some(Arc::new(SlowDetector(Duration::from_millis(500)))),
            Some(Arc::new(FixedText(vec!["late"]))),
        );
        let app = app_with_config(
            models,
            ApiConfig {
                request_timeout: Duration::from_millis(50),
                ..ApiConfig::default()
            },
        );

        let (status, headers, body) = send(app, detect_request(image_upload(&png(32, 32)))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors(&headers);
        let value = json(&body);
        assert!(value["error"].as_str().unwrap().contains("timed out"));
        assert!(value.get("image").is_none());
    }
}
