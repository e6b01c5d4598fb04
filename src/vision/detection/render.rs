// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Drawing detections onto a pixel buffer
//!
//! Each box gets a class color from a fixed palette, a stroke that scales
//! with the image size, and (when a font is available) a filled caption
//! band with `<label> <confidence>` in white.

use ab_glyph::{Font, FontVec, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

use super::postprocess::Detection;
use crate::vision::preprocessing::{ChannelOrder, PixelBuffer};

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: [u8; 3] = [255, 255, 255];

const SYSTEM_FONTS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// RGB color assigned to a class
pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

/// Stroke width in pixels: `max(round((w + h) / 2 * 0.003), 2)`
pub fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

/// Font used for captions; boxes are still drawn without one
#[derive(Default)]
pub struct RenderStyle {
    font: Option<FontVec>,
}

impl std::fmt::Debug for RenderStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStyle")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl RenderStyle {
    pub fn with_font_path(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read font {}: {}", path.display(), e))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|_| anyhow::anyhow!("Failed to parse font file: {}", path.display()))?;
        Ok(Self { font: Some(font) })
    }

    /// Search common system locations for a sans font
    pub fn with_system_font() -> Self {
        for path in &SYSTEM_FONTS {
            if let Ok(data) = std::fs::read(path) {
                if let Ok(font) = FontVec::try_from_vec(data) {
                    info!("Loaded caption font: {}", path);
                    return Self { font: Some(font) };
                }
            }
        }

        debug!("No system font found, detection captions will be skipped");
        Self::default()
    }

    /// Explicit font if given and readable, otherwise the system search
    pub fn resolve(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::with_font_path(path).unwrap_or_else(|e| {
                tracing::warn!("{:#}, falling back to system fonts", e);
                Self::with_system_font()
            }),
            None => Self::with_system_font(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

/// Copy of `buffer` with every detection drawn on it.
///
/// Dimensions and channel order are preserved.
pub fn draw_detections(buffer: &PixelBuffer, detections: &[Detection], style: &RenderStyle) -> PixelBuffer {
    let order = buffer.order();
    let mut canvas = buffer.samples().clone();
    let (width, height) = canvas.dimensions();
    let thickness = line_width(width, height);
    let font_scale = (thickness as f32 * 6.0).max(12.0);

    for detection in detections {
        let Some(rect) = box_rect(detection, width, height) else {
            continue;
        };
        let color = stored_color(class_color(detection.class_id), order);

        for inset in 0..thickness {
            let w = rect.width().saturating_sub(2 * inset);
            let h = rect.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let ring = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, ring, color);
        }

        if let Some(font) = &style.font {
            draw_caption(&mut canvas, font, font_scale, &rect, &detection.caption(), color, order);
        }
    }

    PixelBuffer::new(canvas, order)
}

fn box_rect(detection: &Detection, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    let x1 = (detection.x1.max(0.0) as u32).min(width - 1);
    let y1 = (detection.y1.max(0.0) as u32).min(height - 1);
    let x2 = (detection.x2.max(0.0) as u32).min(width);
    let y2 = (detection.y2.max(0.0) as u32).min(height);

    (x2 > x1 && y2 > y1).then(|| Rect::at(x1 as i32, y1 as i32).of_size(x2 - x1, y2 - y1))
}

fn draw_caption(
    canvas: &mut RgbImage,
    font: &FontVec,
    scale: f32,
    rect: &Rect,
    caption: &str,
    color: Rgb<u8>,
    order: ChannelOrder,
) {
    let scaled = font.as_scaled(scale);
    let text_width: f32 = caption
        .chars()
        .map(|ch| scaled.h_advance(scaled.scaled_glyph(ch).id))
        .sum();
    let band_w = (text_width.ceil() as u32 + 4).min(canvas.width());
    let band_h = (scaled.height().ceil() as u32 + 2).min(canvas.height());
    if band_w == 0 || band_h == 0 {
        return;
    }

    // Above the box when there is room, otherwise just inside its top edge
    let top = if rect.top() >= band_h as i32 {
        rect.top() - band_h as i32
    } else {
        rect.top()
    };
    let left = rect.left().min(canvas.width() as i32 - band_w as i32).max(0);

    draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(band_w, band_h), color);
    draw_text_mut(
        canvas,
        stored_color(TEXT_COLOR, order),
        left + 2,
        top + 1,
        scale,
        font,
        caption,
    );
}

fn stored_color(rgb: [u8; 3], order: ChannelOrder) -> Rgb<u8> {
    match order {
        ChannelOrder::Rgb => Rgb(rgb),
        ChannelOrder::Bgr => Rgb([rgb[2], rgb[1], rgb[0]]),
    }
}
