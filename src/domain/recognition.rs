//! Output of the inference capability.

use super::geometry::BoundingBox;
use serde::{Deserialize, Serialize};

/// Recognized text for one page, as produced by an inference session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// The recognized text.
    pub text: String,
    /// Confidence score in the range 0..=100.
    pub confidence: f32,
    /// Regions the text was read from, in reading order. May be empty.
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

impl RecognitionResult {
    /// Creates a result with no bounding boxes.
    ///
    /// The confidence is clamped into 0..=100.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 100.0),
            bounding_boxes: Vec::new(),
        }
    }

    /// Attaches bounding boxes.
    pub fn with_bounding_boxes(mut self, bounding_boxes: Vec<BoundingBox>) -> Self {
        self.bounding_boxes = bounding_boxes;
        self
    }

    /// Returns true if no text was recognized.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(RecognitionResult::new("x", 140.0).confidence, 100.0);
        assert_eq!(RecognitionResult::new("x", -3.0).confidence, 0.0);
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        assert!(RecognitionResult::new("  \n", 90.0).is_empty());
        assert!(!RecognitionResult::new("TOTAL 42.00", 90.0).is_empty());
    }

    #[test]
    fn serializes_boxes() {
        let result = RecognitionResult::new("Invoice", 97.5)
            .with_bounding_boxes(vec![BoundingBox::from_coords(0.0, 0.0, 10.0, 5.0)]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["text"], "Invoice");
        assert_eq!(json["bounding_boxes"][0]["points"].as_array().unwrap().len(), 4);
    }
}
