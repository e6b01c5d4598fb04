// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use detect_ocr_node::{
    api::{start_server, AppState},
    version, DetectionPipeline, NodeConfig, VisionModelManager,
};
use std::{env, sync::Arc};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = NodeConfig::parse();

    info!("🚀 Starting {}", version::get_version_string());
    info!("📦 Model cache: {}", config.model_dir.display());

    let models = Arc::new(VisionModelManager::new(config.vision_model_config()).await?);

    if config.preload_models {
        info!("Preloading models...");
        // Requests retry lazily if this fails
        if let Err(e) = models.preload().await {
            warn!("⚠️ Model preload failed: {}", e);
        }
    }

    let pipeline = Arc::new(DetectionPipeline::new(models, config.pipeline_config()));
    let state = AppState::new(pipeline, config.api_config());

    start_server(state)
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

    info!("👋 Node stopped");
    Ok(())
}
