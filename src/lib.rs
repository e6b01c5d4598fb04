// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod models;
pub mod version;
pub mod vision;

pub use api::{create_app, ApiConfig, ApiError, AppState, ErrorStatusPolicy};
pub use config::NodeConfig;
pub use vision::{DetectionPipeline, PipelineConfig, VisionModelConfig, VisionModelManager};
