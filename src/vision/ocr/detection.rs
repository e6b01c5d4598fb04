// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! PaddleOCR text detection model
//!
//! The model outputs a text probability map. Regions are recovered with
//! DB-style post-processing: binarize, collect connected components, score
//! each component by its mean probability, then expand ("unclip") the box
//! so it covers the full glyph extent.

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::{preprocess_for_detection, DetectionInput, DET_MAX_SIDE};

/// Post-processing thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbParams {
    /// Probability above which a pixel counts as text
    pub pixel_threshold: f32,
    /// Minimum mean probability over a region
    pub box_threshold: f32,
    /// Minimum pixel count of a region
    pub min_pixels: usize,
    /// Expansion ratio applied to each region box
    pub unclip_ratio: f32,
    /// Minimum side of a kept box, in source pixels
    pub min_side: f32,
    /// Longest side fed to the model
    pub max_side: u32,
}

impl Default for DbParams {
    fn default() -> Self {
        Self {
            pixel_threshold: 0.3,
            box_threshold: 0.6,
            min_pixels: 10,
            unclip_ratio: 1.5,
            min_side: 3.0,
            max_side: DET_MAX_SIDE,
        }
    }
}

/// Axis-aligned text region in source image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Mean text probability over the region
    pub score: f32,
}

impl TextBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Corners clockwise from top-left
    pub fn polygon(&self) -> [[f32; 2]; 4] {
        [
            [self.x1, self.y1],
            [self.x2, self.y1],
            [self.x2, self.y2],
            [self.x1, self.y2],
        ]
    }
}

/// PaddleOCR text detection model (CPU)
#[derive(Clone)]
pub struct OcrDetectionModel {
    session: Arc<Mutex<Session>>,
    input_name: String,
    params: DbParams,
}

impl std::fmt::Debug for OcrDetectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrDetectionModel")
            .field("input_name", &self.input_name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl OcrDetectionModel {
    /// Load the detection model from a file
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime rejects it.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("OCR detection model not found: {}", model_path.display());
        }

        info!("Loading OCR detection model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load OCR detection model from {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        debug!("Detection model input: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            params: DbParams::default(),
        })
    }

    /// Find text regions in a BGR image, in reading order
    pub fn detect(&self, bgr: &RgbImage) -> Result<Vec<TextBox>> {
        let input = preprocess_for_detection(bgr, self.params.max_side);
        let (width, height) = bgr.dimensions();

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("OCR detection session lock poisoned"))?;

        let input_value =
            Value::from_array(input.tensor.clone()).context("Failed to create input tensor")?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Detection inference failed")?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        let map = probability_map(output_tensor.view())?;
        let boxes = boxes_from_probability_map(map, &input, &self.params, width, height);

        debug!("Detected {} text regions", boxes.len());
        Ok(boxes)
    }
}

/// Squeeze a `[1, 1, H, W]` or `[1, H, W]` output down to `[H, W]`
pub fn probability_map(output: ArrayViewD<'_, f32>) -> Result<ArrayView2<'_, f32>> {
    let shape = output.shape().to_vec();
    let squeezed = match shape.len() {
        4 if shape[0] == 1 && shape[1] == 1 => output.index_axis_move(Axis(0), 0).index_axis_move(Axis(0), 0),
        3 if shape[0] == 1 => output.index_axis_move(Axis(0), 0),
        _ => anyhow::bail!("Unexpected detection output shape: {:?}", shape),
    };
    squeezed
        .into_dimensionality::<Ix2>()
        .map_err(|e| anyhow::anyhow!("Detection output is not a 2-D map: {}", e))
}

/// Turn a probability map into scored, expanded boxes in source coordinates
pub fn boxes_from_probability_map(
    map: ArrayView2<'_, f32>,
    input: &DetectionInput,
    params: &DbParams,
    source_width: u32,
    source_height: u32,
) -> Vec<TextBox> {
    let (map_h, map_w) = map.dim();
    // The map may be smaller than the input tensor
    let input_h = input.tensor.shape()[2] as f32;
    let input_w = input.tensor.shape()[3] as f32;
    let scale_x = input_w / map_w.max(1) as f32;
    let scale_y = input_h / map_h.max(1) as f32;

    let mut visited = vec![false; map_h * map_w];
    let mut boxes = Vec::new();

    for y in 0..map_h {
        for x in 0..map_w {
            if visited[y * map_w + x] || map[[y, x]] < params.pixel_threshold {
                continue;
            }

            let region = flood_fill(&map, &mut visited, x, y, params.pixel_threshold);
            if region.count <= params.min_pixels {
                continue;
            }
            let score = region.sum / region.count as f32;
            if score < params.box_threshold {
                continue;
            }

            let (bx1, by1, bx2, by2) = unclip(
                region.min_x as f32,
                region.min_y as f32,
                (region.max_x + 1) as f32,
                (region.max_y + 1) as f32,
                params.unclip_ratio,
            );

            let (x1, y1) = input.to_source(bx1 * scale_x, by1 * scale_y);
            let (x2, y2) = input.to_source(bx2 * scale_x, by2 * scale_y);
            let text_box = TextBox {
                x1: x1.clamp(0.0, source_width as f32),
                y1: y1.clamp(0.0, source_height as f32),
                x2: x2.clamp(0.0, source_width as f32),
                y2: y2.clamp(0.0, source_height as f32),
                score,
            };

            if text_box.width() >= params.min_side && text_box.height() >= params.min_side {
                boxes.push(text_box);
            }
        }
    }

    sort_reading_order(&mut boxes);
    boxes
}

struct Region {
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
    count: usize,
    sum: f32,
}

fn flood_fill(
    map: &ArrayView2<'_, f32>,
    visited: &mut [bool],
    start_x: usize,
    start_y: usize,
    threshold: f32,
) -> Region {
    let (height, width) = map.dim();
    let mut region = Region {
        min_x: start_x,
        max_x: start_x,
        min_y: start_y,
        max_y: start_y,
        count: 0,
        sum: 0.0,
    };
    let mut stack = vec![(start_x, start_y)];

    while let Some((x, y)) = stack.pop() {
        let idx = y * width + x;
        if visited[idx] {
            continue;
        }
        let prob = map[[y, x]];
        if prob < threshold {
            continue;
        }

        visited[idx] = true;
        region.count += 1;
        region.sum += prob;
        region.min_x = region.min_x.min(x);
        region.max_x = region.max_x.max(x);
        region.min_y = region.min_y.min(y);
        region.max_y = region.max_y.max(y);

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < width {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < height {
            stack.push((x, y + 1));
        }
    }

    region
}

/// Grow a box outward by `area * ratio / perimeter` on every side
pub fn unclip(x1: f32, y1: f32, x2: f32, y2: f32, ratio: f32) -> (f32, f32, f32, f32) {
    let (w, h) = (x2 - x1, y2 - y1);
    let perimeter = 2.0 * (w + h);
    if perimeter <= 0.0 {
        return (x1, y1, x2, y2);
    }
    let distance = w * h * ratio / perimeter;
    (x1 - distance, y1 - distance, x2 + distance, y2 + distance)
}

/// Top-to-bottom, then left-to-right; boxes whose tops are within 10px
/// count as the same line
pub fn sort_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        a.y1.partial_cmp(&b.y1)
            .unwrap_or(Ordering::Equal)
            .then(a.x1.partial_cmp(&b.x1).unwrap_or(Ordering::Equal))
    });

    for i in 0..boxes.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            if (boxes[j + 1].y1 - boxes[j].y1).abs() < 10.0 && boxes[j + 1].x1 < boxes[j].x1 {
                boxes.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
}
