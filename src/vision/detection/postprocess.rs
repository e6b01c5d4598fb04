// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding of raw YOLOv8 output into image-space detections

use anyhow::Result;
use ndarray::{ArrayViewD, Axis, Ix2};
use std::cmp::Ordering;

use super::labels::{class_label, COCO_CLASSES};
use super::preprocess::Letterbox;

/// Box coordinates plus one score per COCO class
const ATTRIBUTES: usize = 4 + COCO_CLASSES.len();

/// Thresholds applied while decoding detector output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloParams {
    /// Square input size of the model
    pub input_size: u32,
    /// Minimum class score to keep a candidate
    pub confidence_threshold: f32,
    /// IoU above which a lower-scored box of the same class is suppressed
    pub iou_threshold: f32,
    /// Upper bound on detections kept per image
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: super::preprocess::DETECTOR_INPUT_SIZE,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// One detected object in source image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Caption drawn on the overlay, e.g. `person 0.87`
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

/// Decode a `[1, 4 + classes, anchors]` output tensor.
///
/// Exports that emit `[1, anchors, 4 + classes]` are accepted as well. The
/// attribute axis is the one whose length is `4 + COCO_CLASSES.len()`; axis 1
/// wins when both match.
pub fn decode_output(
    output: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    params: &YoloParams,
) -> Result<Vec<Detection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        anyhow::bail!("Unexpected detector output shape: {:?}", shape);
    }

    let table = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| anyhow::anyhow!("Detector output is not 2-D per batch: {}", e))?;
    // Rows are attributes, columns are anchors
    let table = if shape[1] == ATTRIBUTES {
        table
    } else if shape[2] == ATTRIBUTES {
        table.reversed_axes()
    } else {
        anyhow::bail!(
            "Detector output has no {}-attribute axis: {:?}",
            ATTRIBUTES,
            shape
        );
    };

    let num_classes = ATTRIBUTES - 4;
    let mut candidates = Vec::new();

    for anchor in table.columns() {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, anchor[4 + c]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        let (x1, y1) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(Detection {
            x1,
            y1,
            x2,
            y2,
            class_id,
            label: class_label(class_id),
            confidence: score,
        });
    }

    let mut kept = non_max_suppression(candidates, params.iou_threshold);
    kept.truncate(params.max_detections);
    Ok(kept)
}

/// Class-aware non-maximum suppression; output is sorted by confidence
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
