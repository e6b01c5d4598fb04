// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end PaddleOCR: region detection followed by per-region recognition

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use super::detection::OcrDetectionModel;
use super::preprocessing::crop_region;
use super::recognition::OcrRecognitionModel;
use crate::vision::pipeline::TextRecognizer;
use crate::vision::preprocessing::{ChannelOrder, PixelBuffer};

/// Results below this recognition confidence are discarded
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// One recognized piece of text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionFragment {
    /// Region corners clockwise from top-left, in image coordinates
    pub polygon: [[f32; 2]; 4],
    pub text: String,
    pub confidence: f32,
}

/// PaddleOCR model for text extraction (CPU)
#[derive(Debug, Clone)]
pub struct PaddleOcrModel {
    detector: OcrDetectionModel,
    recognizer: OcrRecognitionModel,
    min_confidence: f32,
}

impl PaddleOcrModel {
    /// Load both models and the dictionary
    pub fn new<P: AsRef<Path>>(det_path: P, rec_path: P, dict_path: P) -> Result<Self> {
        Ok(Self {
            detector: OcrDetectionModel::new(det_path)?,
            recognizer: OcrRecognitionModel::new(rec_path, dict_path)?,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        })
    }

    /// Recognize all text in a BGR image, in reading order
    pub fn process(&self, bgr: &RgbImage) -> Result<Vec<RecognitionFragment>> {
        let boxes = self.detector.detect(bgr)?;
        let mut fragments = Vec::with_capacity(boxes.len());

        for text_box in &boxes {
            let Some(crop) = crop_region(bgr, text_box.x1, text_box.y1, text_box.x2, text_box.y2) else {
                continue;
            };

            let recognized = self.recognizer.recognize(&crop)?;
            if recognized.is_empty() || recognized.confidence < self.min_confidence {
                debug!(
                    "Dropping region {:?}: {:?} ({:.2})",
                    text_box.polygon(),
                    recognized.text,
                    recognized.confidence
                );
                continue;
            }

            fragments.push(RecognitionFragment {
                polygon: text_box.polygon(),
                text: recognized.text,
                confidence: recognized.confidence,
            });
        }

        debug!("Recognized {} of {} regions", fragments.len(), boxes.len());
        Ok(fragments)
    }
}

impl TextRecognizer for PaddleOcrModel {
    fn recognize(&self, buffer: &PixelBuffer) -> Result<Vec<RecognitionFragment>> {
        self.process(&buffer.samples_in(ChannelOrder::Bgr))
    }
}
