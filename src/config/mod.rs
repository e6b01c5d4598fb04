// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration from command-line flags and environment variables

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{ApiConfig, ErrorStatusPolicy};
use crate::vision::encoding::DEFAULT_JPEG_QUALITY;
use crate::vision::model_manager::DEFAULT_YOLO_URL;
use crate::vision::preprocessing::{DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH};
use crate::vision::{PipelineConfig, PreprocessConfig, VisionModelConfig};

/// Detect/OCR node
#[derive(Parser, Debug, Clone)]
#[command(name = "detect-ocr-node")]
#[command(version)]
#[command(about = "Object detection and OCR over HTTP", long_about = None)]
pub struct NodeConfig {
    /// Address to bind
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory for cached model weights
    #[arg(long, env = "MODEL_DIR", default_value = "./models")]
    pub model_dir: PathBuf,

    /// Download URL for the YOLOv8 ONNX export
    #[arg(long, env = "YOLO_MODEL_URL", default_value = DEFAULT_YOLO_URL)]
    pub yolo_url: String,

    /// Images wider than this are downscaled
    #[arg(long, env = "MAX_IMAGE_WIDTH", default_value_t = DEFAULT_MAX_WIDTH)]
    pub max_width: u32,

    /// Images taller than this are downscaled
    #[arg(long, env = "MAX_IMAGE_HEIGHT", default_value_t = DEFAULT_MAX_HEIGHT)]
    pub max_height: u32,

    /// Quality of the returned JPEG (1-100)
    #[arg(long, env = "JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,

    /// Run detection and OCR concurrently
    #[arg(long, env = "PARALLEL_STAGES")]
    pub parallel_stages: bool,

    /// `uniform` (always 500) or `per-kind` status codes on failure
    #[arg(long, env = "ERROR_STATUS_POLICY", default_value = "uniform")]
    pub error_status: ErrorStatusPolicy,

    /// TTF/OTF font for detection captions
    #[arg(long, env = "LABEL_FONT_PATH")]
    pub label_font: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Load both models at startup instead of on the first request
    #[arg(long, env = "PRELOAD_MODELS")]
    pub preload_models: bool,
}

impl NodeConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            listen_addr: self.listen_addr(),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            error_status_policy: self.error_status,
            ..ApiConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            preprocess: PreprocessConfig {
                max_width: self.max_width.max(1),
                max_height: self.max_height.max(1),
                ..PreprocessConfig::default()
            },
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
            parallel_stages: self.parallel_stages,
        }
    }

    pub fn vision_model_config(&self) -> VisionModelConfig {
        let mut config = VisionModelConfig {
            model_dir: self.model_dir.clone(),
            label_font: self.label_font.clone(),
            ..VisionModelConfig::default()
        };
        config.detector.url = self.yolo_url.clone();
        config
    }
}
