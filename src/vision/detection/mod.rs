// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detection stage
//!
//! Components:
//! - `preprocess` - Letterboxing into the detector input tensor
//! - `postprocess` - Output decoding and non-maximum suppression
//! - `render` - Box and caption overlay
//! - `model` - ONNX Runtime YOLOv8 wrapper

pub mod labels;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod render;

pub use model::YoloDetector;
pub use postprocess::{Detection, YoloParams};
pub use render::RenderStyle;
