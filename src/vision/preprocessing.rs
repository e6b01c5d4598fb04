// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding and bounding of uploaded images
//!
//! Produces the [`PixelBuffer`] shared by the detection and recognition
//! stages: 8-bit, 3-channel, with an explicit channel order, and never
//! larger than the configured bounds (1280x720 by default).

use image::imageops::FilterType;
use image::RgbImage;
use std::borrow::Cow;
use tracing::debug;

use super::image_utils::decode_image_bytes;
use crate::api::detect::request::RawUpload;
use crate::api::errors::ApiError;

/// Default maximum width before downscaling
pub const DEFAULT_MAX_WIDTH: u32 = 1280;

/// Default maximum height before downscaling
pub const DEFAULT_MAX_HEIGHT: u32 = 720;

/// Order in which color samples are stored per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    Rgb,
    /// Blue-green-red, the layout both inference stages receive by default
    #[default]
    Bgr,
}

/// Decoded image as a height x width grid of 3 x 8-bit samples
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pixels: RgbImage,
    order: ChannelOrder,
}

impl PixelBuffer {
    /// Wrap samples already stored in `order`
    pub fn new(pixels: RgbImage, order: ChannelOrder) -> Self {
        Self { pixels, order }
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self::new(pixels, ChannelOrder::Rgb)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Raw samples in the stored channel order
    pub fn samples(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn samples_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    /// Reorder the samples in place to `order`
    pub fn with_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            swap_red_blue(&mut self.pixels);
            self.order = order;
        }
        self
    }

    /// Samples in `order`, borrowing when no reorder is needed
    pub fn samples_in(&self, order: ChannelOrder) -> Cow<'_, RgbImage> {
        if self.order == order {
            Cow::Borrowed(&self.pixels)
        } else {
            let mut swapped = self.pixels.clone();
            swap_red_blue(&mut swapped);
            Cow::Owned(swapped)
        }
    }

    pub fn to_rgb(&self) -> Cow<'_, RgbImage> {
        self.samples_in(ChannelOrder::Rgb)
    }

    pub fn into_rgb(self) -> RgbImage {
        self.with_order(ChannelOrder::Rgb).pixels
    }

    /// Resize to exactly `width` x `height` with bilinear filtering
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            pixels: image::imageops::resize(&self.pixels, width, height, FilterType::Triangle),
            order: self.order,
        }
    }
}

fn swap_red_blue(img: &mut RgbImage) {
    for pixel in img.pixels_mut() {
        pixel.0.swap(0, 2);
    }
}

/// Bounds and layout applied to every upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub channel_order: ChannelOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            channel_order: ChannelOrder::default(),
        }
    }
}

/// Target size for an image that exceeds the bounds, `None` if it fits.
///
/// A single uniform factor `min(max_w / w, max_h / h)` is applied to both
/// sides and the results are truncated, so the aspect ratio holds within
/// one pixel. Never upscales.
pub fn bounded_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> Option<(u32, u32)> {
    if width <= max_width && height <= max_height {
        return None;
    }

    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let new_width = ((width as f64 * scale) as u32).clamp(1, max_width.max(1));
    let new_height = ((height as f64 * scale) as u32).clamp(1, max_height.max(1));

    Some((new_width, new_height))
}

/// Decode an upload into a bounded [`PixelBuffer`]
///
/// # Errors
/// `ApiError::DecodeError` if the bytes are not a decodable image.
pub fn prepare_image(upload: &RawUpload, config: &PreprocessConfig) -> Result<PixelBuffer, ApiError> {
    let (image, info) =
        decode_image_bytes(&upload.bytes).map_err(|e| ApiError::DecodeError(e.to_string()))?;

    debug!(
        "Decoded {} upload: {}x{} ({:?}, {} bytes)",
        upload.content_type, info.width, info.height, info.format, info.size_bytes
    );

    let buffer = PixelBuffer::from_rgb(image.to_rgb8()).with_order(config.channel_order);

    match bounded_dimensions(info.width, info.height, config.max_width, config.max_height) {
        Some((width, height)) => {
            debug!(
                "Downscaling {}x{} -> {}x{}",
                info.width, info.height, width, height
            );
            Ok(buffer.resized(width, height))
        }
        None => Ok(buffer),
    }
}
