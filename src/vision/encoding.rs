// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! JPEG + base64 encoding of the annotated image

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;

use super::preprocessing::PixelBuffer;
use crate::api::detect::response::ResponseDocument;
use crate::api::errors::ApiError;

/// JPEG quality used when none is configured
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Compress a buffer to baseline JPEG.
///
/// JPEG is always written as RGB, whatever order the buffer stores.
pub fn encode_jpeg(buffer: &PixelBuffer, quality: u8) -> Result<Vec<u8>, ApiError> {
    let rgb = buffer.to_rgb();
    let mut out = Cursor::new(Vec::with_capacity(rgb.as_raw().len() / 8));

    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&*rgb)
        .map_err(|e| ApiError::EncodeError(e.to_string()))?;

    Ok(out.into_inner())
}

/// Build the response document from the annotated buffer and joined text
pub fn encode_response(
    annotated: &PixelBuffer,
    text: String,
    quality: u8,
) -> Result<ResponseDocument, ApiError> {
    let jpeg = encode_jpeg(annotated, quality)?;
    Ok(ResponseDocument {
        image: STANDARD.encode(jpeg),
        text,
    })
}
