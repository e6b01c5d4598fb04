// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! PaddleOCR text recognition stage
//!
//! Components:
//! - `detection` - Text region detection (DB post-processing)
//! - `recognition` - CTC text recognition of detected regions
//! - `preprocessing` - Tensor preparation for both models
//! - `model` - Combined OCR pipeline

pub mod detection;
pub mod model;
pub mod preprocessing;
pub mod recognition;

pub use detection::{DbParams, OcrDetectionModel, TextBox};
pub use model::{PaddleOcrModel, RecognitionFragment};
pub use recognition::{CharDictionary, OcrRecognitionModel, RecognizedText};
