// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request pipeline: extract, preprocess, detect, recognize, encode
//!
//! Every request walks the stages below in order. Any stage failure
//! short-circuits to [`PipelineStage::Failed`] and no partial result is
//! returned. With `parallel_stages` enabled, detection and recognition run
//! concurrently on the same read-only buffer; the response is assembled
//! identically either way.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::encoding::{encode_response, DEFAULT_JPEG_QUALITY};
use super::model_manager::VisionModelInfo;
use super::ocr::RecognitionFragment;
use super::preprocessing::{prepare_image, PixelBuffer, PreprocessConfig};
use crate::api::detect::request::extract_image_part;
use crate::api::detect::response::ResponseDocument;
use crate::api::errors::ApiError;

/// Draws detected objects onto an image
#[cfg_attr(test, mockall::automock)]
pub trait ObjectDetector: Send + Sync {
    /// Annotated copy of `buffer`, same dimensions and channel order
    fn annotate(&self, buffer: &PixelBuffer) -> anyhow::Result<PixelBuffer>;
}

/// Reads text out of an image
#[cfg_attr(test, mockall::automock)]
pub trait TextRecognizer: Send + Sync {
    /// Fragments in reading order
    fn recognize(&self, buffer: &PixelBuffer) -> anyhow::Result<Vec<RecognitionFragment>>;
}

/// Source of ready model handles
///
/// Implementations load lazily on first use and return
/// `ApiError::ModelUnavailable` when weights cannot be obtained.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn detector(&self) -> Result<Arc<dyn ObjectDetector>, ApiError>;
    async fn recognizer(&self) -> Result<Arc<dyn TextRecognizer>, ApiError>;
    /// Status of each model, for health reporting
    fn describe(&self) -> Vec<VisionModelInfo>;
}

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Extracting,
    Preprocessing,
    Detecting,
    Recognizing,
    Encoding,
    Responded,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Preprocessing => "preprocessing",
            PipelineStage::Detecting => "detecting",
            PipelineStage::Recognizing => "recognizing",
            PipelineStage::Encoding => "encoding",
            PipelineStage::Responded => "responded",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records stage transitions for one request
#[derive(Debug)]
pub struct StageTracker {
    history: Vec<PipelineStage>,
    started: Instant,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            history: vec![PipelineStage::Received],
            started: Instant::now(),
        }
    }

    pub fn enter(&mut self, stage: PipelineStage) {
        debug!(stage = %stage, elapsed_ms = self.started.elapsed().as_millis() as u64, "Entering stage");
        self.history.push(stage);
    }

    pub fn current(&self) -> PipelineStage {
        self.history.last().copied().unwrap_or(PipelineStage::Received)
    }

    pub fn history(&self) -> &[PipelineStage] {
        &self.history
    }

    fn fail(&mut self, error: &ApiError) {
        warn!(
            stage = %self.current(),
            kind = error.kind(),
            "Pipeline failed: {}",
            error
        );
        self.history.push(PipelineStage::Failed);
    }
}

/// Pipeline settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub jpeg_quality: u8,
    /// Run detection and recognition concurrently
    pub parallel_stages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            parallel_stages: false,
        }
    }
}

/// Join fragment texts one per line, trailing whitespace trimmed
pub fn join_fragments(fragments: &[RecognitionFragment]) -> String {
    let mut text = String::new();
    for fragment in fragments {
        text.push_str(&fragment.text);
        text.push('\n');
    }
    text.truncate(text.trim_end().len());
    text
}

/// Run the detector, checking it kept the buffer geometry
pub fn run_detection(detector: &dyn ObjectDetector, buffer: &PixelBuffer) -> Result<PixelBuffer, ApiError> {
    let annotated = detector
        .annotate(buffer)
        .map_err(|e| ApiError::InternalError(format!("Object detection failed: {:#}", e)))?;

    if annotated.dimensions() != buffer.dimensions() || annotated.order() != buffer.order() {
        return Err(ApiError::InternalError(format!(
            "Detector changed image geometry: {:?} -> {:?}",
            buffer.dimensions(),
            annotated.dimensions()
        )));
    }
    Ok(annotated)
}

/// Run the recognizer and join its fragments
pub fn run_recognition(recognizer: &dyn TextRecognizer, buffer: &PixelBuffer) -> Result<String, ApiError> {
    let fragments = recognizer
        .recognize(buffer)
        .map_err(|e| ApiError::InternalError(format!("Text recognition failed: {:#}", e)))?;
    debug!("Recognized {} text fragments", fragments.len());
    Ok(join_fragments(&fragments))
}

async fn blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ApiError::InternalError(format!("Pipeline task failed: {}", e)))?
}

/// Image analysis pipeline shared by all requests
pub struct DetectionPipeline {
    models: Arc<dyn ModelProvider>,
    config: PipelineConfig,
}

impl DetectionPipeline {
    pub fn new(models: Arc<dyn ModelProvider>, config: PipelineConfig) -> Self {
        Self { models, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn models(&self) -> &Arc<dyn ModelProvider> {
        &self.models
    }

    /// Process one request body into a response document
    pub async fn run(&self, body: Bytes, boundary: Option<String>) -> Result<ResponseDocument, ApiError> {
        let mut tracker = StageTracker::new();
        self.run_tracked(&mut tracker, body, boundary).await
    }

    /// As [`run`](Self::run), recording transitions in `tracker`
    pub async fn run_tracked(
        &self,
        tracker: &mut StageTracker,
        body: Bytes,
        boundary: Option<String>,
    ) -> Result<ResponseDocument, ApiError> {
        match self.execute(tracker, body, boundary).await {
            Ok(document) => {
                tracker.enter(PipelineStage::Responded);
                Ok(document)
            }
            Err(error) => {
                tracker.fail(&error);
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        tracker: &mut StageTracker,
        body: Bytes,
        boundary: Option<String>,
    ) -> Result<ResponseDocument, ApiError> {
        tracker.enter(PipelineStage::Extracting);
        let upload = extract_image_part(&body, boundary.as_deref()).await?;
        drop(body);
        debug!("Extracted {} image part ({} bytes)", upload.content_type, upload.len());

        tracker.enter(PipelineStage::Preprocessing);
        let preprocess = self.config.preprocess;
        let buffer = Arc::new(blocking(move || prepare_image(&upload, &preprocess)).await?);

        let (annotated, text) = if self.config.parallel_stages {
            self.detect_and_recognize(tracker, buffer).await?
        } else {
            tracker.enter(PipelineStage::Detecting);
            let detector = self.models.detector().await?;
            let input = Arc::clone(&buffer);
            let annotated = blocking(move || run_detection(detector.as_ref(), &input)).await?;

            tracker.enter(PipelineStage::Recognizing);
            let recognizer = self.models.recognizer().await?;
            let text = blocking(move || run_recognition(recognizer.as_ref(), &buffer)).await?;
            (annotated, text)
        };

        tracker.enter(PipelineStage::Encoding);
        let quality = self.config.jpeg_quality;
        blocking(move || encode_response(&annotated, text, quality)).await
    }

    /// Both stages at once; a detection error wins over a recognition error
    async fn detect_and_recognize(
        &self,
        tracker: &mut StageTracker,
        buffer: Arc<PixelBuffer>,
    ) -> Result<(PixelBuffer, String), ApiError> {
        tracker.enter(PipelineStage::Detecting);
        let detector = self.models.detector().await?;
        tracker.enter(PipelineStage::Recognizing);
        let recognizer = self.models.recognizer().await?;

        let det_input = Arc::clone(&buffer);
        let (annotated, text) = tokio::join!(
            blocking(move || run_detection(detector.as_ref(), &det_input)),
            blocking(move || run_recognition(recognizer.as_ref(), &buffer)),
        );
        Ok((annotated?, text?))
    }
}
