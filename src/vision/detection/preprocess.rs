// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Letterbox preprocessing for the object detector

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

/// Square input size expected by YOLOv8 exports
pub const DETECTOR_INPUT_SIZE: u32 = 640;

/// Gray used to pad the letterboxed input (114/255)
pub const PAD_VALUE: u8 = 114;

/// Geometry of a letterbox, needed to map boxes back to the source image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale applied to the source image
    pub scale: f32,
    /// Horizontal padding on the left edge
    pub pad_x: f32,
    /// Vertical padding on the top edge
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn new(width: u32, height: u32, target_size: u32) -> Self {
        let scale = if width == 0 || height == 0 {
            1.0
        } else {
            (target_size as f32 / width as f32).min(target_size as f32 / height as f32)
        };
        let (new_w, new_h) = scaled_size(width, height, scale);

        Self {
            scale,
            pad_x: ((target_size - new_w.min(target_size)) / 2) as f32,
            pad_y: ((target_size - new_h.min(target_size)) / 2) as f32,
            source_width: width,
            source_height: height,
        }
    }

    /// Map a point in letterboxed input space back to the source image,
    /// clamped to its bounds
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.pad_x) / self.scale).clamp(0.0, self.source_width as f32);
        let sy = ((y - self.pad_y) / self.scale).clamp(0.0, self.source_height as f32);
        (sx, sy)
    }
}

fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    (new_w, new_h)
}

/// Letterbox an RGB image into a `[1, 3, size, size]` tensor scaled to `[0, 1]`
pub fn letterbox_tensor(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::new(image.width(), image.height(), size);
    let (new_w, new_h) = scaled_size(image.width(), image.height(), letterbox.scale);
    let resized = image::imageops::resize(image, new_w.min(size), new_h.min(size), FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array4::from_elem((1, 3, side, side), PAD_VALUE as f32 / 255.0);

    let offset_x = letterbox.pad_x as usize;
    let offset_y = letterbox.pad_y as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + offset_x, y as usize + offset_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, letterbox)
}
