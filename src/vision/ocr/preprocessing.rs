// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for PaddleOCR
//!
//! Both models were trained on BGR input, so tensors are filled from
//! BGR samples without reordering.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

/// Longest side fed to the text detector
pub const DET_MAX_SIDE: u32 = 960;

/// Detector input sides must be multiples of this stride
pub const DET_STRIDE: u32 = 32;

/// Recognition model input height
pub const REC_INPUT_HEIGHT: u32 = 48;

/// Minimum recognition input width; narrower crops are zero-padded
pub const REC_MIN_WIDTH: u32 = 320;

/// Upper bound on recognition input width
pub const REC_MAX_WIDTH: u32 = 2048;

/// Detector normalization mean, in BGR order of the samples
pub const DET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Detector normalization std, in BGR order of the samples
pub const DET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Detector input tensor plus the per-axis ratios used to build it
#[derive(Debug, Clone)]
pub struct DetectionInput {
    pub tensor: Array4<f32>,
    /// Resized width / source width
    pub ratio_w: f32,
    /// Resized height / source height
    pub ratio_h: f32,
}

impl DetectionInput {
    /// Map a point on the detector input back to the source image
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (x / self.ratio_w, y / self.ratio_h)
    }
}

/// Side lengths for the detector: longest side capped at `max_side`,
/// each side rounded to the nearest multiple of [`DET_STRIDE`]
pub fn detection_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height).max(1);
    let ratio = if longest > max_side {
        max_side as f32 / longest as f32
    } else {
        1.0
    };

    let round = |side: u32| {
        let scaled = side as f32 * ratio;
        let steps = (scaled / DET_STRIDE as f32).round() as u32;
        steps.max(1) * DET_STRIDE
    };
    (round(width), round(height))
}

/// Build the `[1, 3, H, W]` detector tensor from BGR samples
pub fn preprocess_for_detection(bgr: &RgbImage, max_side: u32) -> DetectionInput {
    let (width, height) = bgr.dimensions();
    let (target_w, target_h) = detection_size(width, height, max_side);
    let resized = image::imageops::resize(bgr, target_w, target_h, FilterType::Triangle);

    let mut tensor = Array4::zeros((1, 3, target_h as usize, target_w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 / 255.0 - DET_MEAN[c]) / DET_STD[c];
        }
    }

    DetectionInput {
        tensor,
        ratio_w: target_w as f32 / width.max(1) as f32,
        ratio_h: target_h as f32 / height.max(1) as f32,
    }
}

/// Build the `[1, 3, 48, W]` recognition tensor from a BGR crop.
///
/// The crop is scaled to the model height keeping its aspect ratio,
/// normalized to `[-1, 1]`, and right-padded with zeros up to
/// [`REC_MIN_WIDTH`].
pub fn preprocess_for_recognition(crop: &RgbImage) -> Array4<f32> {
    let (width, height) = crop.dimensions();
    let ratio = width.max(1) as f32 / height.max(1) as f32;
    let resized_w = ((REC_INPUT_HEIGHT as f32 * ratio).ceil() as u32).clamp(1, REC_MAX_WIDTH);
    let tensor_w = resized_w.max(REC_MIN_WIDTH);

    let resized = image::imageops::resize(crop, resized_w, REC_INPUT_HEIGHT, FilterType::Triangle);

    let mut tensor = Array4::zeros((1, 3, REC_INPUT_HEIGHT as usize, tensor_w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - 0.5) / 0.5;
        }
    }

    tensor
}

/// Copy the axis-aligned region `[x1, x2) x [y1, y2)`, clamped to the image
pub fn crop_region(image: &RgbImage, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    let left = (x1.max(0.0).floor() as u32).min(width);
    let top = (y1.max(0.0).floor() as u32).min(height);
    let right = (x2.max(0.0).ceil() as u32).min(width);
    let bottom = (y2.max(0.0).ceil() as u32).min(height);

    if right <= left || bottom <= top {
        return None;
    }
    Some(image::imageops::crop_imm(image, left, top, right - left, bottom - top).to_image())
}
