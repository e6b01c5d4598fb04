// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod errors;
pub mod http_server;
pub mod server;

pub use detect::{detect_handler, ResponseDocument};
pub use errors::{ApiError, ErrorResponse, ErrorStatusPolicy};
pub use http_server::{create_app, start_server, AppState, HealthResponse};
pub use server::ApiConfig;
