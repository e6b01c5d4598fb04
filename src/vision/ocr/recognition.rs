// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! PaddleOCR text recognition model
//!
//! Recognizes the text in one cropped region using CTC greedy decoding.

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::preprocess_for_recognition;

/// Recognized text with confidence score
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    /// Mean probability of the emitted characters (0.0-1.0)
    pub confidence: f32,
}

impl RecognizedText {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Character table for CTC decoding.
///
/// Index 0 is the CTC blank, indices `1..=n` are the dictionary lines in
/// order, and the final index is a space.
#[derive(Debug, Clone, PartialEq)]
pub struct CharDictionary {
    symbols: Vec<String>,
}

impl CharDictionary {
    /// Build from dictionary text, one symbol per line
    pub fn parse(contents: &str) -> Self {
        let mut symbols = vec![String::new()];
        symbols.extend(
            contents
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        symbols.push(" ".to_string());
        Self { symbols }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open dictionary: {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    /// Number of classes including the blank
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.len() <= 2
    }

    pub fn symbol(&self, index: usize) -> Option<&str> {
        match index {
            0 => None,
            _ => self.symbols.get(index).map(String::as_str),
        }
    }
}

/// Greedy CTC decode of a `[timesteps, classes]` probability table.
///
/// Takes the best class per step, collapses repeats, and drops blanks.
/// A blank between two equal symbols separates them.
pub fn ctc_greedy_decode(probs: ArrayView2<'_, f32>, dictionary: &CharDictionary) -> RecognizedText {
    let mut text = String::new();
    let mut total = 0.0f32;
    let mut emitted = 0usize;
    let mut previous = 0usize;

    for step in probs.rows() {
        let (index, prob) = step
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        if index != 0 && index != previous {
            if let Some(symbol) = dictionary.symbol(index) {
                text.push_str(symbol);
                total += prob;
                emitted += 1;
            }
        }
        previous = index;
    }

    let confidence = if emitted == 0 { 0.0 } else { total / emitted as f32 };
    RecognizedText { text, confidence }
}

/// PaddleOCR text recognition model (CPU)
#[derive(Clone)]
pub struct OcrRecognitionModel {
    session: Arc<Mutex<Session>>,
    dictionary: Arc<CharDictionary>,
    input_name: String,
}

impl std::fmt::Debug for OcrRecognitionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrRecognitionModel")
            .field("dictionary_size", &self.dictionary.len())
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl OcrRecognitionModel {
    /// Load the recognition model and its character dictionary
    ///
    /// # Errors
    /// Returns error if either file is missing or ONNX Runtime rejects the model.
    pub fn new<P: AsRef<Path>, D: AsRef<Path>>(model_path: P, dict_path: D) -> Result<Self> {
        let model_path = model_path.as_ref();
        let dict_path = dict_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("OCR recognition model not found: {}", model_path.display());
        }
        if !dict_path.exists() {
            anyhow::bail!("OCR character dictionary not found: {}", dict_path.display());
        }

        info!("Loading OCR recognition model from {}", model_path.display());

        let dictionary = CharDictionary::load(dict_path)?;
        if dictionary.is_empty() {
            anyhow::bail!("OCR character dictionary is empty: {}", dict_path.display());
        }
        info!("Loaded character dictionary with {} classes", dictionary.len());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("Failed to load OCR recognition model from {}", model_path.display())
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        debug!("Recognition model input: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            dictionary: Arc::new(dictionary),
            input_name,
        })
    }

    /// Recognize the text in one BGR crop
    pub fn recognize(&self, crop: &RgbImage) -> Result<RecognizedText> {
        let input = preprocess_for_recognition(crop);

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("OCR recognition session lock poisoned"))?;

        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Recognition inference failed")?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        let table = step_table(output_tensor.view())?;
        if table.ncols() != self.dictionary.len() {
            debug!(
                "Recognition classes ({}) differ from dictionary size ({})",
                table.ncols(),
                self.dictionary.len()
            );
        }

        Ok(ctc_greedy_decode(table, &self.dictionary))
    }
}

/// Squeeze a `[1, T, C]` or `[T, C]` output to `[T, C]`
fn step_table(output: ArrayViewD<'_, f32>) -> Result<ArrayView2<'_, f32>> {
    let shape = output.shape().to_vec();
    let table = match shape.len() {
        3 if shape[0] == 1 => output.index_axis_move(Axis(0), 0),
        2 => output,
        _ => anyhow::bail!("Unexpected recognition output shape: {:?}", shape),
    };
    table
        .into_dimensionality::<Ix2>()
        .map_err(|e| anyhow::anyhow!("Recognition output is not 2-D: {}", e))
}
