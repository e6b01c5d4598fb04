// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! CPU-based image analysis
//!
//! This module provides:
//! - Upload decoding and bounding (`preprocessing`)
//! - Object detection with YOLOv8 (`detection`)
//! - Text recognition with PaddleOCR (`ocr`)
//! - The request pipeline tying them together (`pipeline`)

pub mod detection;
pub mod encoding;
pub mod image_utils;
pub mod model_manager;
pub mod ocr;
pub mod pipeline;
pub mod preprocessing;

pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use model_manager::{VisionModelConfig, VisionModelInfo, VisionModelManager};
pub use pipeline::{
    DetectionPipeline, ModelProvider, ObjectDetector, PipelineConfig, PipelineStage, TextRecognizer,
};
pub use preprocessing::{ChannelOrder, PixelBuffer, PreprocessConfig};
