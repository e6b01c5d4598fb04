// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OCR post-processing on synthetic model outputs

use detect_ocr_node::vision::ocr::{
    detection::boxes_from_probability_map,
    preprocessing::{preprocess_for_detection, preprocess_for_recognition, DET_MAX_SIDE},
    recognition::ctc_greedy_decode,
    CharDictionary, DbParams,
};
use image::{Rgb, RgbImage};
use ndarray::Array2;

/// Probability map with a block of `value` over `[x1, x2) x [y1, y2)`
fn paint(map: &mut Array2<f32>, x1: usize, y1: usize, x2: usize, y2: usize, value: f32) {
    for y in y1..y2 {
        for x in x1..x2 {
            map[[y, x]] = value;
        }
    }
}

/// One-hot `[timesteps, classes]` table
fn one_hot(indices: &[usize], classes: usize) -> Array2<f32> {
    let mut table = Array2::<f32>::zeros((indices.len(), classes));
    for (t, &i) in indices.iter().enumerate() {
        table[[t, i]] = 0.9;
    }
    table
}

#[cfg(test)]
mod ocr_tests {
    use super::*;

    /// Test 1: Two text lines come back top to bottom in source coordinates
    #[test]
    fn test_two_lines_in_reading_order() {
        let source = RgbImage::from_pixel(640, 320, Rgb([255, 255, 255]));
        let input = preprocess_for_detection(&source, DET_MAX_SIDE);
        let (h, w) = (input.tensor.shape()[2], input.tensor.shape()[3]);
        assert_eq!((w, h), (640, 320));

        let mut map = Array2::<f32>::zeros((h, w));
        paint(&mut map, 300, 200, 500, 230, 0.9);
        paint(&mut map, 40, 40, 300, 80, 0.95);

        let boxes = boxes_from_probability_map(map.view(), &input, &DbParams::default(), 640, 320);

        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].y1 < boxes[1].y1);
        // Unclipped outward, so the box covers the painted block
        assert!(boxes[0].x1 <= 40.0 && boxes[0].x2 >= 300.0);
        assert!(boxes.iter().all(|b| b.x2 <= 640.0 && b.y2 <= 320.0));
    }

    /// Test 2: Boxes on the same line read left to right
    #[test]
    fn test_same_line_left_to_right() {
        let source = RgbImage::new(640, 320);
        let input = preprocess_for_detection(&source, DET_MAX_SIDE);
        let mut map = Array2::<f32>::zeros((320, 640));
        // The right block starts a few pixels higher
        paint(&mut map, 400, 100, 560, 130, 0.9);
        paint(&mut map, 40, 104, 200, 130, 0.9);

        let boxes = boxes_from_probability_map(map.view(), &input, &DbParams::default(), 640, 320);

        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].x1 < boxes[1].x1);
    }

    /// Test 3: Weak or tiny regions are ignored
    #[test]
    fn test_faint_and_tiny_regions_dropped() {
        let source = RgbImage::new(640, 320);
        let input = preprocess_for_detection(&source, DET_MAX_SIDE);
        let mut map = Array2::<f32>::zeros((320, 640));
        // Above the pixel threshold but below the box threshold
        paint(&mut map, 10, 10, 200, 60, 0.4);
        // Three pixels only
        paint(&mut map, 400, 200, 403, 201, 0.99);

        let boxes = boxes_from_probability_map(map.view(), &input, &DbParams::default(), 640, 320);

        assert!(boxes.is_empty());
    }

    /// Test 4: Greedy CTC collapses repeats and respects blanks
    #[test]
    fn test_ctc_decodes_text() {
        let dictionary = CharDictionary::parse("A\nB\nO\nP\nS\nT\n");
        // blank=0, A=1, B=2, O=3, P=4, S=5, T=6, space=7
        let steps = [5, 5, 0, 6, 3, 3, 0, 4, 7, 2, 0, 2];

        let decoded = ctc_greedy_decode(one_hot(&steps, dictionary.len()).view(), &dictionary);

        assert_eq!(decoded.text, "STOP BB");
        assert!((decoded.confidence - 0.9).abs() < 1e-6);
    }

    /// Test 5: Recognition input is 48 high, at least 320 wide, in [-1, 1]
    #[test]
    fn test_recognition_tensor_geometry() {
        let crop = RgbImage::from_pixel(100, 20, Rgb([255, 0, 128]));
        let tensor = preprocess_for_recognition(&crop);

        assert_eq!(&tensor.shape()[..3], &[1, 3, 48]);
        assert_eq!(tensor.shape()[3], 320);
        assert!(tensor.iter().all(|v| (-1.0..=1.0).contains(v)));
        // Padding is zero
        assert_eq!(tensor[[0, 0, 10, 319]], 0.0);
    }
}
