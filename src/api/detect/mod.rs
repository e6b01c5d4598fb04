// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection API endpoint module
//!
//! Provides POST /api/detect for object detection plus OCR on an
//! uploaded image. Its OPTIONS preflight is answered by the CORS layer.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::detect_handler;
pub use request::{extract_image_part, RawUpload};
pub use response::{cors_headers, ResponseDocument};
