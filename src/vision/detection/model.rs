// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv8 object detector backed by ONNX Runtime

use anyhow::{Context, Result};
use image::RgbImage;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::postprocess::{decode_output, Detection, YoloParams};
use super::preprocess::letterbox_tensor;
use super::render::{draw_detections, RenderStyle};
use crate::vision::pipeline::ObjectDetector;
use crate::vision::preprocessing::PixelBuffer;

/// Pretrained YOLOv8 detector (80 COCO classes)
///
/// Runs on CPU. The session is shared behind a mutex so one loaded model
/// serves every request.
pub struct YoloDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    params: YoloParams,
    style: RenderStyle,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("params", &self.params)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Load the detector from an ONNX export
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime rejects it.
    pub fn new<P: AsRef<Path>>(model_path: P, params: YoloParams, style: RenderStyle) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Detector model not found: {}", model_path.display());
        }

        info!("Loading object detector from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load detector from {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        debug!("Detector input: {}, params: {:?}", input_name, params);
        info!("Object detector loaded (CPU)");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            params,
            style,
        })
    }

    pub fn params(&self) -> &YoloParams {
        &self.params
    }

    /// Detect objects in an RGB image, boxes in its own coordinates
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (input, letterbox) = letterbox_tensor(image, self.params.input_size);

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Detector session lock poisoned"))?;

        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Detector inference failed")?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract detector output")?;

        debug!("Detector output shape: {:?}", output_tensor.shape());

        let detections = decode_output(output_tensor.view(), &letterbox, &self.params)?;
        debug!("Detected {} objects", detections.len());

        Ok(detections)
    }
}

impl ObjectDetector for YoloDetector {
    fn annotate(&self, buffer: &PixelBuffer) -> Result<PixelBuffer> {
        let detections = self.detect(&buffer.to_rgb())?;
        Ok(draw_detections(buffer, &detections, &self.style))
    }
}
