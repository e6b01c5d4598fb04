// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision model manager without network access
//!
//! Every source points at 127.0.0.1:1, which refuses connections, so
//! these tests exercise the lazy-load and failure paths only. The
//! `#[ignore]`d test needs the real weights in `./models`.

use detect_ocr_node::vision::{ModelProvider, VisionModelConfig, VisionModelManager};
use std::path::Path;

fn offline_config(dir: &Path) -> VisionModelConfig {
    let mut config = VisionModelConfig {
        model_dir: dir.to_path_buf(),
        ..VisionModelConfig::default()
    };
    for source in [
        &mut config.detector,
        &mut config.ocr_detection,
        &mut config.ocr_recognition,
        &mut config.ocr_dictionary,
    ] {
        source.url = format!("http://127.0.0.1:1/{}", source.filename);
    }
    config
}

#[cfg(test)]
mod model_manager_tests {
    use super::*;

    /// Test 1: Default sources point at the published YOLOv8n and PaddleOCR exports
    #[test]
    fn test_default_sources() {
        let config = VisionModelConfig::default();

        assert!(config.detector.url.ends_with("yolov8n.onnx"));
        assert!(config.ocr_detection.url.ends_with("/det.onnx"));
        assert!(config.ocr_recognition.url.ends_with("/rec.onnx"));
        assert!(config.ocr_dictionary.url.ends_with("/dict.txt"));
        assert_eq!(config.ocr_dictionary.filename, "paddleocr/dict.txt");
    }

    /// Test 2: The cache directory is created and nothing loads up front
    #[tokio::test]
    async fn test_manager_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("weights");

        let manager = VisionModelManager::new(offline_config(&model_dir)).await.unwrap();

        assert!(model_dir.is_dir());
        assert!(!manager.is_detector_loaded());
        assert!(!manager.is_ocr_loaded());

        let models = manager.describe();
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| !m.loaded && !m.cached));
    }

    /// Test 3: Unreachable weights become a model-unavailable error, and retry later
    #[tokio::test]
    async fn test_unreachable_weights() {
        let dir = tempfile::tempdir().unwrap();
        let manager = VisionModelManager::new(offline_config(dir.path())).await.unwrap();

        for _ in 0..2 {
            let err = manager.detector().await.err().expect("download must fail");
            assert!(matches!(err, detect_ocr_node::ApiError::ModelUnavailable(_)));
            assert!(err.to_string().contains("yolov8n"));
        }
        assert!(manager.recognizer().await.is_err());
        assert!(!manager.is_detector_loaded());
    }

    /// Test 4: Cached files are used without downloading, and bad weights fail cleanly
    #[tokio::test]
    async fn test_corrupt_cached_weights() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yolov8n.onnx"), b"not an onnx graph").unwrap();
        let manager = VisionModelManager::new(offline_config(dir.path())).await.unwrap();

        assert!(manager.describe()[0].cached);
        let err = manager.detector().await.err().expect("load must fail");
        assert!(matches!(err, detect_ocr_node::ApiError::ModelUnavailable(_)));
    }

    /// Test 5: Real weights load once and are shared
    #[tokio::test]
    #[ignore = "requires downloaded model weights in ./models"]
    async fn test_real_models_load_once() {
        let manager = VisionModelManager::new(VisionModelConfig::default()).await.unwrap();

        manager.preload().await.unwrap();
        let first = manager.yolo().await.unwrap();
        let second = manager.yolo().await.unwrap();

        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert!(manager.is_detector_loaded());
        assert!(manager.is_ocr_loaded());
    }
}
