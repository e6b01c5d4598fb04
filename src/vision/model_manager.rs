// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision model manager: lazy, process-wide detector and OCR handles
//!
//! Each model is fetched into the weight cache and loaded at most once. A
//! failed load leaves the slot empty so the next request retries.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::api::errors::ApiError;
use crate::models::{DownloadConfig, ModelDownloader, WeightSource};
use crate::vision::detection::{RenderStyle, YoloDetector, YoloParams};
use crate::vision::ocr::PaddleOcrModel;
use crate::vision::pipeline::{ModelProvider, ObjectDetector, TextRecognizer};

pub const DEFAULT_YOLO_URL: &str = "https://huggingface.co/Kalray/yolov8/resolve/main/yolov8n.onnx";

const PADDLEOCR_BASE_URL: &str = "https://huggingface.co/monkt/paddleocr-onnx/resolve/main";

/// Configuration for locating and loading vision models
#[derive(Debug, Clone)]
pub struct VisionModelConfig {
    /// Weight cache directory
    pub model_dir: PathBuf,
    pub detector: WeightSource,
    pub ocr_detection: WeightSource,
    pub ocr_recognition: WeightSource,
    pub ocr_dictionary: WeightSource,
    pub yolo: YoloParams,
    /// Caption font; the system fonts are searched when unset
    pub label_font: Option<PathBuf>,
}

impl Default for VisionModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models"),
            detector: WeightSource::new("yolov8n", DEFAULT_YOLO_URL, "yolov8n.onnx"),
            ocr_detection: WeightSource::new(
                "paddleocr-det",
                format!("{}/detection/v3/det.onnx", PADDLEOCR_BASE_URL),
                "paddleocr/det.onnx",
            ),
            ocr_recognition: WeightSource::new(
                "paddleocr-rec",
                format!("{}/languages/english/rec.onnx", PADDLEOCR_BASE_URL),
                "paddleocr/rec.onnx",
            ),
            ocr_dictionary: WeightSource::new(
                "paddleocr-dict",
                format!("{}/languages/english/dict.txt", PADDLEOCR_BASE_URL),
                "paddleocr/dict.txt",
            ),
            yolo: YoloParams::default(),
            label_font: None,
        }
    }
}

/// Status of one model, as reported by `/health`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionModelInfo {
    pub name: String,
    /// detection or ocr
    pub model_type: String,
    /// Loaded into memory
    pub loaded: bool,
    /// Weights present in the cache
    pub cached: bool,
}

/// Manager for the detector and OCR models
pub struct VisionModelManager {
    config: VisionModelConfig,
    downloader: ModelDownloader,
    detector: OnceCell<Arc<YoloDetector>>,
    recognizer: OnceCell<Arc<PaddleOcrModel>>,
}

impl VisionModelManager {
    /// Create the manager and its cache directory; nothing is loaded yet
    pub async fn new(config: VisionModelConfig) -> anyhow::Result<Self> {
        let downloader = ModelDownloader::new(DownloadConfig {
            download_dir: config.model_dir.clone(),
            ..DownloadConfig::default()
        })
        .await?;

        Ok(Self {
            config,
            downloader,
            detector: OnceCell::new(),
            recognizer: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &VisionModelConfig {
        &self.config
    }

    async fn fetch(&self, source: &WeightSource) -> Result<PathBuf, ApiError> {
        self.downloader.ensure(source).await.map_err(|e| {
            warn!("Failed to obtain {}: {}", source.name, e);
            ApiError::ModelUnavailable(format!("{}: {}", source.name, e))
        })
    }

    /// The object detector, loading it on first call
    pub async fn yolo(&self) -> Result<Arc<YoloDetector>, ApiError> {
        self.detector
            .get_or_try_init(|| async {
                let path = self.fetch(&self.config.detector).await?;
                let params = self.config.yolo;
                let font = self.config.label_font.clone();

                let detector = tokio::task::spawn_blocking(move || {
                    YoloDetector::new(path, params, RenderStyle::resolve(font.as_deref()))
                })
                .await
                .map_err(|e| ApiError::InternalError(format!("Detector load task failed: {}", e)))?
                .map_err(|e| ApiError::ModelUnavailable(format!("{:#}", e)))?;

                info!("✅ Object detector ready");
                Ok::<_, ApiError>(Arc::new(detector))
            })
            .await
            .cloned()
    }

    /// The OCR model, loading it on first call
    pub async fn ocr(&self) -> Result<Arc<PaddleOcrModel>, ApiError> {
        self.recognizer
            .get_or_try_init(|| async {
                let det = self.fetch(&self.config.ocr_detection).await?;
                let rec = self.fetch(&self.config.ocr_recognition).await?;
                let dict = self.fetch(&self.config.ocr_dictionary).await?;

                let model = tokio::task::spawn_blocking(move || PaddleOcrModel::new(det, rec, dict))
                    .await
                    .map_err(|e| ApiError::InternalError(format!("OCR load task failed: {}", e)))?
                    .map_err(|e| ApiError::ModelUnavailable(format!("{:#}", e)))?;

                info!("✅ PaddleOCR ready");
                Ok::<_, ApiError>(Arc::new(model))
            })
            .await
            .cloned()
    }

    /// Load both models now instead of on the first request
    pub async fn preload(&self) -> Result<(), ApiError> {
        self.yolo().await?;
        self.ocr().await?;
        Ok(())
    }

    pub fn is_detector_loaded(&self) -> bool {
        self.detector.initialized()
    }

    pub fn is_ocr_loaded(&self) -> bool {
        self.recognizer.initialized()
    }

    /// List all vision models
    pub fn list_models(&self) -> Vec<VisionModelInfo> {
        let ocr_cached = [
            &self.config.ocr_detection,
            &self.config.ocr_recognition,
            &self.config.ocr_dictionary,
        ]
        .iter()
        .all(|source| self.downloader.is_cached(source));

        vec![
            VisionModelInfo {
                name: self.config.detector.name.clone(),
                model_type: "detection".to_string(),
                loaded: self.is_detector_loaded(),
                cached: self.downloader.is_cached(&self.config.detector),
            },
            VisionModelInfo {
                name: "paddleocr".to_string(),
                model_type: "ocr".to_string(),
                loaded: self.is_ocr_loaded(),
                cached: ocr_cached,
            },
        ]
    }
}

#[async_trait]
impl ModelProvider for VisionModelManager {
    async fn detector(&self) -> Result<Arc<dyn ObjectDetector>, ApiError> {
        Ok(self.yolo().await? as Arc<dyn ObjectDetector>)
    }

    async fn recognizer(&self) -> Result<Arc<dyn TextRecognizer>, ApiError> {
        Ok(self.ocr().await? as Arc<dyn TextRecognizer>)
    }

    fn describe(&self) -> Vec<VisionModelInfo> {
        self.list_models()
    }
}
