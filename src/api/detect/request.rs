// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload extraction for POST /api/detect
//!
//! The endpoint receives a `multipart/form-data` body with a single image
//! part. With a declared boundary the buffered body is handed to `multer`
//! and the first field whose content type is `image/*` is returned.
//! Without one (or when the body does not parse against the declared
//! boundary) a minimal scanner looks for the first `Content-Type: image/`
//! header and cuts the payload at the next `\r\n--`.
//!
//! The scanner cannot tell a real boundary from the same bytes inside the
//! image payload, so it is only used when the caller gives us nothing better.

use bytes::Bytes;
use std::convert::Infallible;
use std::ops::Range;
use tracing::debug;

use crate::api::errors::ApiError;

const IMAGE_HEADER: &[u8] = b"Content-Type: image/";
const HEADER_NAME: &[u8] = b"Content-Type:";
const HEADER_END: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";
const LOOSE_DELIMITER: &[u8] = b"\r\n--";

/// Image bytes pulled out of an upload body
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpload {
    /// Payload of the image part, exactly as sent
    pub bytes: Bytes,
    /// Content type declared by the part (e.g. `image/png`)
    pub content_type: String,
}

impl RawUpload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read the `boundary` parameter from a `multipart/*` Content-Type value
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let essence = params.next()?.trim();
    if !essence.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }

    params.find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Extract the first image part from `body`
///
/// # Errors
/// `ApiError::MalformedUpload` when no image-typed part exists or its
/// header block is never terminated.
pub async fn extract_image_part(body: &Bytes, boundary: Option<&str>) -> Result<RawUpload, ApiError> {
    let upload = match boundary {
        Some(boundary) => match read_image_field(body.clone(), boundary).await {
            Ok(Some(upload)) => upload,
            Ok(None) => {
                return Err(ApiError::MalformedUpload(
                    "No image found in request".to_string(),
                ))
            }
            Err(e) => {
                debug!("Body does not parse against declared boundary ({}), falling back to header scan", e);
                scan_upload(body)?
            }
        },
        None => scan_upload(body)?,
    };

    debug!("Extracted image part: {} bytes ({})", upload.len(), upload.content_type);
    Ok(upload)
}

/// First `image/*` field of a multipart body, `None` when there is none
async fn read_image_field(body: Bytes, boundary: &str) -> Result<Option<RawUpload>, multer::Error> {
    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(field) = multipart.next_field().await? {
        let content_type = match field.content_type() {
            Some(mime) if mime.type_() == "image" => mime.essence_str().to_ascii_lowercase(),
            _ => continue,
        };
        debug!("Image field {:?} ({})", field.name(), content_type);
        let bytes = field.bytes().await?;
        return Ok(Some(RawUpload { bytes, content_type }));
    }

    Ok(None)
}

fn scan_upload(body: &Bytes) -> Result<RawUpload, ApiError> {
    let (range, content_type) = scan_image_part(body)?;
    Ok(RawUpload {
        bytes: body.slice(range),
        content_type,
    })
}

/// Minimal single-part scan, used when no boundary is known
fn scan_image_part(body: &[u8]) -> Result<(Range<usize>, String), ApiError> {
    let header_start = find(body, IMAGE_HEADER, 0).ok_or_else(|| {
        ApiError::MalformedUpload("No image found in request".to_string())
    })?;

    let separator = find(body, HEADER_END, header_start).ok_or_else(|| {
        ApiError::MalformedUpload("Image part header is not terminated".to_string())
    })?;
    let start = separator + HEADER_END.len();

    let end = find(body, LOOSE_DELIMITER, start).unwrap_or(body.len());

    let line_end = find(body, CRLF, header_start).unwrap_or(separator);
    let content_type = String::from_utf8_lossy(&body[header_start + HEADER_NAME.len()..line_end])
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    Ok((start..end, content_type))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
