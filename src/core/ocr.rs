use std::fs;
use std::path::Path;

use image::RgbImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine, OcrEngineParams, TextItem};

use crate::error::{AutomationError, AutomationResult};

/// One recognized line of text, in the pixel coordinates of the captured image.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub confidence: f32,
}

impl TextFragment {
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// Text recognition over a captured screen region.
pub trait TextRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> AutomationResult<Vec<TextFragment>>;
}

/// Recognizer backed by the ocrs engine.
pub struct OcrsRecognizer {
    engine: OcrEngine,
    scale_factor: u32,
}

impl OcrsRecognizer {
    /// Load detection and recognition models from disk.
    pub fn from_files(
        detection_model: &Path,
        recognition_model: &Path,
        scale_factor: u32,
    ) -> AutomationResult<Self> {
        let detection_bytes = fs::read(detection_model).map_err(|e| {
            AutomationError::Ocr(format!(
                "cannot read detection model '{}': {}",
                detection_model.display(),
                e
            ))
        })?;
        let recognition_bytes = fs::read(recognition_model).map_err(|e| {
            AutomationError::Ocr(format!(
                "cannot read recognition model '{}': {}",
                recognition_model.display(),
                e
            ))
        })?;

        let detection_model = rten::Model::load(detection_bytes)
            .map_err(|e| AutomationError::Ocr(format!("Detection model error: {:?}", e)))?;
        let recognition_model = rten::Model::load(recognition_bytes)
            .map_err(|e| AutomationError::Ocr(format!("Recognition model error: {:?}", e)))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| AutomationError::Ocr(format!("OCR Engine error: {:?}", e)))?;

        Ok(Self {
            engine,
            scale_factor: scale_factor.max(1),
        })
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> AutomationResult<Vec<TextFragment>> {
        let scale = self.scale_factor;
        let mut processed = image::DynamicImage::ImageRgb8(image.clone());
        if scale > 1 {
            let (w, h) = (processed.width(), processed.height());
            processed = processed.resize(w * scale, h * scale, image::imageops::FilterType::Lanczos3);
        }

        let rgb_img = processed.into_rgb8();
        let (width, height) = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), (width, height))
            .map_err(|e| AutomationError::Ocr(format!("Image Error: {:?}", e)))?;
        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| AutomationError::Ocr(format!("Prep Error: {:?}", e)))?;

        let words = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| AutomationError::Ocr(format!("Detection Error: {:?}", e)))?;
        let line_rects = self.engine.find_text_lines(&ocr_input, &words);
        let lines = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| AutomationError::Ocr(format!("Recognition Error: {:?}", e)))?;

        let scale = scale as i32;
        let fragments = lines
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line.to_string();
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let rect = line.bounding_rect();
                Some(TextFragment {
                    text: trimmed.to_string(),
                    left: rect.left() / scale,
                    top: rect.top() / scale,
                    right: rect.right() / scale,
                    bottom: rect.bottom() / scale,
                    confidence: legibility(trimmed),
                })
            })
            .collect();

        Ok(fragments)
    }
}

/// ocrs reports no per-line probability. Score a line by the share of
/// characters that are alphanumeric or whitespace; garbled reads of
/// low-contrast text are dominated by punctuation noise.
pub fn legibility(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let clean = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    clean as f32 / total as f32
}

/// Thresholds tried by a search, from `initial` down to `min` in `step`
/// decrements. The last entry is always exactly `min`.
pub fn confidence_schedule(initial: f32, min: f32, step: f32) -> Vec<f32> {
    if initial <= min || step <= 0.0 {
        return vec![min.max(initial)];
    }
    // Integer thousandths avoid drifting float accumulation
    let initial_k = (initial * 1000.0).round() as i32;
    let min_k = (min * 1000.0).round() as i32;
    let step_k = ((step * 1000.0).round() as i32).max(1);

    let mut schedule = Vec::new();
    let mut current = initial_k;
    while current > min_k {
        schedule.push(current as f32 / 1000.0);
        current -= step_k;
    }
    schedule.push(min_k as f32 / 1000.0);
    schedule
}

/// Highest-confidence fragment containing `target` (case-insensitive) with
/// confidence at or above `threshold`.
pub fn best_match<'a>(
    fragments: &'a [TextFragment],
    target: &str,
    threshold: f32,
) -> Option<&'a TextFragment> {
    let needle = target.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    fragments
        .iter()
        .filter(|f| f.confidence >= threshold && f.text.to_lowercase().contains(&needle))
        .fold(None, |best: Option<&TextFragment>, f| match best {
            Some(b) if b.confidence >= f.confidence => Some(b),
            _ => Some(f),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, confidence: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            left: 10,
            top: 20,
            right: 110,
            bottom: 40,
            confidence,
        }
    }

    #[test]
    fn test_schedule_ends_exactly_at_min() {
        assert_eq!(confidence_schedule(0.60, 0.25, 0.10), vec![0.6, 0.5, 0.4, 0.3, 0.25]);
        assert_eq!(confidence_schedule(0.55, 0.20, 0.10), vec![0.55, 0.45, 0.35, 0.25, 0.2]);
        assert_eq!(confidence_schedule(0.5, 0.2, 0.1), vec![0.5, 0.4, 0.3, 0.2]);
    }

    #[test]
    fn test_schedule_degenerate_inputs() {
        assert_eq!(confidence_schedule(0.2, 0.2, 0.1), vec![0.2]);
        assert_eq!(confidence_schedule(0.6, 0.2, 0.0), vec![0.6]);
    }

    #[test]
    fn test_best_match_is_case_insensitive_and_picks_highest() {
        let fragments = vec![
            fragment("Open tool", 0.7),
            fragment("OPEN TOOL now", 0.9),
            fragment("open toolbox", 0.4),
            fragment("Settings", 1.0),
        ];
        let best = best_match(&fragments, "open tool", 0.5).unwrap();
        assert_eq!(best.text, "OPEN TOOL now");
    }

    #[test]
    fn test_best_match_respects_threshold() {
        let fragments = vec![fragment("open tool", 0.3)];
        assert!(best_match(&fragments, "Open Tool", 0.5).is_none());
        assert!(best_match(&fragments, "Open Tool", 0.25).is_some());
        assert!(best_match(&fragments, "  ", 0.0).is_none());
    }

    #[test]
    fn test_legibility_penalizes_noise() {
        assert_eq!(legibility("OPEN TOOL"), 1.0);
        assert!(legibility("0P3N ~|~ T00L;;") < 0.8);
        assert_eq!(legibility(""), 0.0);
        assert_eq!(fragment("x", 1.0).center(), (60, 30));
    }
}
