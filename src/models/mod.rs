// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model weight management

pub mod downloading;

pub use downloading::{DownloadConfig, DownloadError, DownloadResult, ModelDownloader, WeightSource};
