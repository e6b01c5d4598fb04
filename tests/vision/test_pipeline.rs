// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request pipeline stage ordering and failure attribution

use async_trait::async_trait;
use bytes::Bytes;
use detect_ocr_node::{
    vision::{
        ocr::RecognitionFragment,
        pipeline::StageTracker,
        ChannelOrder, DetectionPipeline, ModelProvider, ObjectDetector, PipelineConfig, PipelineStage,
        PixelBuffer, TextRecognizer, VisionModelConfig, VisionModelInfo, VisionModelManager,
    },
    ApiError,
};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Records the channel order and size of every buffer it sees
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(ChannelOrder, (u32, u32))>>,
}

impl ObjectDetector for Recorder {
    fn annotate(&self, buffer: &PixelBuffer) -> anyhow::Result<PixelBuffer> {
        self.seen.lock().unwrap().push((buffer.order(), buffer.dimensions()));
        Ok(buffer.clone())
    }
}

impl TextRecognizer for Recorder {
    fn recognize(&self, buffer: &PixelBuffer) -> anyhow::Result<Vec<RecognitionFragment>> {
        self.seen.lock().unwrap().push((buffer.order(), buffer.dimensions()));
        Ok(vec![
            RecognitionFragment {
                polygon: [[0.0; 2]; 4],
                text: "first".to_string(),
                confidence: 0.8,
            },
            RecognitionFragment {
                polygon: [[0.0; 2]; 4],
                text: "second  ".to_string(),
                confidence: 0.7,
            },
        ])
    }
}

struct Shared(Arc<Recorder>);

#[async_trait]
impl ModelProvider for Shared {
    async fn detector(&self) -> Result<Arc<dyn ObjectDetector>, ApiError> {
        Ok(self.0.clone() as Arc<dyn ObjectDetector>)
    }

    async fn recognizer(&self) -> Result<Arc<dyn TextRecognizer>, ApiError> {
        Ok(self.0.clone() as Arc<dyn TextRecognizer>)
    }

    fn describe(&self) -> Vec<VisionModelInfo> {
        Vec::new()
    }
}

fn upload(width: u32, height: u32) -> (Bytes, Option<String>) {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, ImageFormat::Png).unwrap();

    let mut body = b"--b0undary\r\nContent-Disposition: form-data; name=\"image\"; filename=\"x.png\"\r\nContent-Type: image/png\r\n\r\n".to_vec();
    body.extend_from_slice(png.get_ref());
    body.extend_from_slice(b"\r\n--b0undary--\r\n");
    (Bytes::from(body), Some("b0undary".to_string()))
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    /// Test 1: Both models receive the same bounded BGR buffer
    #[tokio::test]
    async fn test_models_see_bounded_bgr_buffer() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = DetectionPipeline::new(Arc::new(Shared(recorder.clone())), PipelineConfig::default());
        let (body, boundary) = upload(2560, 1440);

        let document = pipeline.run(body, boundary).await.unwrap();

        assert_eq!(document.text, "first\nsecond");
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|&(order, dims)| order == ChannelOrder::Bgr && dims == (1280, 720)));
    }

    /// Test 2: A successful request walks every stage in order
    #[tokio::test]
    async fn test_stage_history() {
        let pipeline = DetectionPipeline::new(
            Arc::new(Shared(Arc::new(Recorder::default()))),
            PipelineConfig::default(),
        );
        let (body, boundary) = upload(64, 48);
        let mut tracker = StageTracker::new();

        pipeline.run_tracked(&mut tracker, body, boundary).await.unwrap();

        assert_eq!(
            tracker.history(),
            &[
                PipelineStage::Received,
                PipelineStage::Extracting,
                PipelineStage::Preprocessing,
                PipelineStage::Detecting,
                PipelineStage::Recognizing,
                PipelineStage::Encoding,
                PipelineStage::Responded,
            ]
        );
    }

    /// Test 3: Parallel mode produces the same document
    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let sequential = DetectionPipeline::new(
            Arc::new(Shared(Arc::new(Recorder::default()))),
            PipelineConfig::default(),
        );
        let parallel = DetectionPipeline::new(
            Arc::new(Shared(Arc::new(Recorder::default()))),
            PipelineConfig {
                parallel_stages: true,
                ..PipelineConfig::default()
            },
        );

        let (body, boundary) = upload(300, 200);
        let a = sequential.run(body.clone(), boundary.clone()).await.unwrap();
        let b = parallel.run(body, boundary).await.unwrap();

        assert_eq!(a, b);
    }

    /// Test 4: Missing weights fail in the detecting stage, after decoding succeeded
    #[tokio::test]
    async fn test_offline_manager_fails_in_detecting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VisionModelConfig {
            model_dir: dir.path().to_path_buf(),
            ..VisionModelConfig::default()
        };
        config.detector.url = "http://127.0.0.1:1/yolov8n.onnx".to_string();
        let manager = VisionModelManager::new(config).await.unwrap();
        let pipeline = DetectionPipeline::new(Arc::new(manager), PipelineConfig::default());

        let (body, boundary) = upload(32, 32);
        let mut tracker = StageTracker::new();
        let result = pipeline.run_tracked(&mut tracker, body, boundary).await;

        assert!(matches!(result, Err(ApiError::ModelUnavailable(_))));
        let history = tracker.history();
        assert_eq!(history[history.len() - 2], PipelineStage::Detecting);
        assert_eq!(tracker.current(), PipelineStage::Failed);
    }
}
