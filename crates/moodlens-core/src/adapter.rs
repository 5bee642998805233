//! Perception adapter: normalizes the expression net's raw output into a
//! fixed-shape probability vector and selects one primary face per frame.
//!
//! The adapter is a pure transform over the collaborator's output. "No face"
//! is a normal value (`Ok(None)`), never an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::emotion::{Emotion, EmotionProbabilities};

#[derive(Error, Debug)]
pub enum DetectError {
    /// The expression net has not finished loading. Callers must treat this
    /// as "try again later", not queue the request.
    #[error("expression model not loaded")]
    NotReady,
    /// Cause-agnostic per-cycle failure; the loop logs it and degrades to
    /// "no face this cycle".
    #[error("detection failed: {0}")]
    Failed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Axis-aligned face bounding region in frame coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// One raw face detection as reported by the expression net: a bounding
/// region plus an unnormalized, string-keyed expression score map.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub region: FaceBox,
    pub scores: HashMap<String, f32>,
}

/// The opaque perception collaborator: given a grayscale frame, return zero
/// or more face detections with raw expression scores.
pub trait ExpressionDetector {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>, DetectError>;
}

/// The selected primary face with its normalized probability vector.
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub region: FaceBox,
    pub probabilities: EmotionProbabilities,
}

/// Pick the primary face: the one with the largest bounding-box area, the
/// most prominent/closest subject. Ties go to the first encountered.
pub fn select_primary(detections: &[RawDetection]) -> Option<&RawDetection> {
    let mut primary: Option<&RawDetection> = None;
    let mut largest_area = 0.0f32;

    for detection in detections {
        let area = detection.region.area();
        if primary.is_none() || area > largest_area {
            largest_area = area;
            primary = Some(detection);
        }
    }

    primary
}

/// Read the seven known categories out of a raw score map, treating missing
/// keys as 0 and clamping each value to [0, 1]. Unknown keys are discarded
/// silently.
pub fn normalize_scores(raw: &HashMap<String, f32>) -> EmotionProbabilities {
    let mut normalized = EmotionProbabilities::default();
    for emotion in Emotion::ALL {
        let value = raw.get(emotion.name()).copied().unwrap_or(0.0);
        normalized.set(emotion, value.clamp(0.0, 1.0));
    }
    normalized
}

/// Wraps an [`ExpressionDetector`] and reduces its per-frame output to at
/// most one [`FaceObservation`].
pub struct PerceptionAdapter<D> {
    detector: D,
}

impl<D: ExpressionDetector> PerceptionAdapter<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Run one detection pass over a frame. `Ok(None)` means no face was
    /// present this cycle.
    pub fn observe(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<FaceObservation>, DetectError> {
        let detections = self.detector.detect(gray, width, height)?;

        let Some(primary) = select_primary(&detections) else {
            return Ok(None);
        };

        Ok(Some(FaceObservation {
            region: primary.region,
            probabilities: normalize_scores(&primary.scores),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f32, w: f32, h: f32, scores: &[(&str, f32)]) -> RawDetection {
        RawDetection {
            region: FaceBox { x, y: 0.0, width: w, height: h },
            scores: scores.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
        }
    }

    struct ScriptedDetector {
        frames: Vec<Result<Vec<RawDetection>, DetectError>>,
    }

    impl ExpressionDetector for ScriptedDetector {
        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<RawDetection>, DetectError> {
            self.frames.remove(0)
        }
    }

    #[test]
    fn test_selects_largest_area_regardless_of_order() {
        let small = detection(0.0, 10.0, 10.0, &[]);
        let large = detection(50.0, 20.0, 20.0, &[]);

        let detections = [small.clone(), large.clone()];
        let picked = select_primary(&detections).unwrap();
        assert!((picked.region.area() - 400.0).abs() < 1e-6);

        let detections = [large, small];
        let picked = select_primary(&detections).unwrap();
        assert!((picked.region.area() - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_equal_areas_keep_first_encountered() {
        let first = detection(0.0, 10.0, 10.0, &[]);
        let second = detection(99.0, 10.0, 10.0, &[]);
        let detections = [first, second];
        let picked = select_primary(&detections).unwrap();
        assert!((picked.region.x).abs() < 1e-6);
    }

    #[test]
    fn test_empty_detections_yield_none() {
        assert!(select_primary(&[]).is_none());
    }

    #[test]
    fn test_normalize_clamps_and_fills_missing() {
        let raw: HashMap<String, f32> = [
            ("happy".to_string(), 1.4),
            ("sad".to_string(), -0.2),
            ("angry".to_string(), 0.25),
            ("smirk".to_string(), 0.9), // unknown category, dropped
        ]
        .into_iter()
        .collect();

        let normalized = normalize_scores(&raw);
        assert_eq!(normalized.happy, 1.0);
        assert_eq!(normalized.sad, 0.0);
        assert!((normalized.angry - 0.25).abs() < 1e-6);
        assert_eq!(normalized.neutral, 0.0);
        assert_eq!(normalized.surprised, 0.0);
        assert_eq!(normalized.fearful, 0.0);
        assert_eq!(normalized.disgusted, 0.0);
    }

    #[test]
    fn test_observe_no_face_is_ok_none() {
        let mut adapter = PerceptionAdapter::new(ScriptedDetector { frames: vec![Ok(vec![])] });
        let observation = adapter.observe(&[], 0, 0).unwrap();
        assert!(observation.is_none());
    }

    #[test]
    fn test_observe_returns_primary_with_normalized_scores() {
        let frames = vec![Ok(vec![
            detection(0.0, 10.0, 10.0, &[("sad", 0.9)]),
            detection(50.0, 30.0, 30.0, &[("happy", 0.8), ("blink", 0.5)]),
        ])];
        let mut adapter = PerceptionAdapter::new(ScriptedDetector { frames });

        let observation = adapter.observe(&[], 0, 0).unwrap().unwrap();
        assert!((observation.region.area() - 900.0).abs() < 1e-6);
        assert!((observation.probabilities.happy - 0.8).abs() < 1e-6);
        assert_eq!(observation.probabilities.sad, 0.0);
    }

    #[test]
    fn test_observe_propagates_detector_errors() {
        let mut adapter = PerceptionAdapter::new(ScriptedDetector {
            frames: vec![Err(DetectError::NotReady)],
        });
        assert!(matches!(adapter.observe(&[], 0, 0), Err(DetectError::NotReady)));
    }
}
