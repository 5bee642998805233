//! Pretrained facial-expression net via ONNX Runtime.
//!
//! The model is an opaque capability: one grayscale frame in, zero or more
//! face rows out, each row carrying a bounding box, a face confidence, and
//! seven expression scores. Nothing in this crate defines or trains the
//! model; it only loads and runs it.

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::adapter::{DetectError, ExpressionDetector, FaceBox, RawDetection};

// --- Model contract constants ---
const EXPRESSION_INPUT_SIZE: usize = 320;
const EXPRESSION_MEAN: f32 = 127.5;
const EXPRESSION_STD: f32 = 128.0;
const FACE_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Output row layout: [x, y, w, h, face_conf, 7 expression scores].
const ROW_STRIDE: usize = 12;
/// Expression score order within a row. This is the model's native order;
/// the perception adapter re-keys into the canonical categories by name.
const SCORE_LABELS: [&str; 7] = [
    "neutral", "happy", "sad", "angry", "fearful", "disgusted", "surprised",
];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — download the expression model and place it in the model dir")]
    ModelNotFound(String),
    #[error("model load failed: {0}")]
    LoadFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Load lifecycle for the session. Held by the net itself rather than a
/// process-wide flag so multiple instances (and tests) cannot interfere.
enum ModelState {
    Unloaded,
    Loading,
    Ready(Session),
}

/// Metadata for mapping detections back out of letterboxed model space.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// ONNX-backed expression net implementing [`ExpressionDetector`].
pub struct ExpressionNet {
    state: ModelState,
    input_size: usize,
}

impl Default for ExpressionNet {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionNet {
    pub fn new() -> Self {
        Self {
            state: ModelState::Unloaded,
            input_size: EXPRESSION_INPUT_SIZE,
        }
    }

    /// Load the model from disk. Idempotent: repeated calls after success
    /// are no-ops, and a call while a load is already in flight returns
    /// immediately. Failure leaves the state `Unloaded` so a retry is
    /// possible.
    pub fn load(&mut self, model_path: &str) -> Result<(), ClassifierError> {
        match self.state {
            ModelState::Ready(_) | ModelState::Loading => return Ok(()),
            ModelState::Unloaded => {}
        }

        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        self.state = ModelState::Loading;

        let session = match Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(2)?))
            .and_then(|mut b| b.commit_from_file(model_path))
        {
            Ok(session) => session,
            Err(e) => {
                self.state = ModelState::Unloaded;
                return Err(ClassifierError::LoadFailed(e.to_string()));
            }
        };

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded expression model"
        );

        self.state = ModelState::Ready(session);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ModelState::Ready(_))
    }
}

impl ExpressionDetector for ExpressionNet {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>, DetectError> {
        // Reject immediately rather than queue: the loop will retry on a
        // later cycle once loading has finished.
        let ModelState::Ready(ref mut session) = self.state else {
            return Err(DetectError::NotReady);
        };

        let expected = (width * height) as usize;
        if gray.len() < expected {
            return Err(DetectError::Failed(format!(
                "frame buffer too short: expected {expected}, got {}",
                gray.len()
            )));
        }

        let (input, letterbox) =
            preprocess_frame(self.input_size, gray, width as usize, height as usize);

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, rows) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::Failed(format!("face rows: {e}")))?;

        Ok(decode_rows(rows, &letterbox, FACE_CONFIDENCE_THRESHOLD))
    }
}

/// Preprocess a grayscale frame into a letterboxed NCHW float tensor.
///
/// Resize and padding happen in one pass: each output pixel is mapped back
/// into source space and bilinearly sampled; out-of-bounds pixels take the
/// model mean (which normalizes to 0).
fn preprocess_frame(
    input_size: usize,
    gray: &[u8],
    width: usize,
    height: usize,
) -> (Array4<f32>, Letterbox) {
    let size = input_size;
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let pad_x = (size as f32 - width as f32 * scale) / 2.0;
    let pad_y = (size as f32 - height as f32 * scale) / 2.0;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        let src_y = (y as f32 + 0.5 - pad_y) / scale - 0.5;
        for x in 0..size {
            let src_x = (x as f32 + 0.5 - pad_x) / scale - 0.5;

            let inside =
                src_x > -1.0 && src_x < width as f32 && src_y > -1.0 && src_y < height as f32;
            let pixel = if inside {
                sample_bilinear(gray, width, height, src_x, src_y)
            } else {
                EXPRESSION_MEAN
            };

            let normalized = (pixel - EXPRESSION_MEAN) / EXPRESSION_STD;
            // Grayscale replicated across the three input channels.
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Bilinearly sample a grayscale image at fractional coordinates.
fn sample_bilinear(gray: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x0 = (x.floor() as i64).clamp(0, width as i64 - 1) as usize;
    let y0 = (y.floor() as i64).clamp(0, height as i64 - 1) as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (x - x.floor()).clamp(0.0, 1.0);
    let fy = (y - y.floor()).clamp(0.0, 1.0);

    let tl = gray[y0 * width + x0] as f32;
    let tr = gray[y0 * width + x1] as f32;
    let bl = gray[y1 * width + x0] as f32;
    let br = gray[y1 * width + x1] as f32;

    tl * (1.0 - fx) * (1.0 - fy) + tr * fx * (1.0 - fy) + bl * (1.0 - fx) * fy + br * fx * fy
}

/// Decode flat output rows into raw detections, mapping boxes back from
/// letterboxed model space into original frame coordinates.
fn decode_rows(rows: &[f32], letterbox: &Letterbox, threshold: f32) -> Vec<RawDetection> {
    let mut detections = Vec::new();

    for row in rows.chunks_exact(ROW_STRIDE) {
        let face_conf = row[4];
        if face_conf <= threshold {
            continue;
        }

        let region = FaceBox {
            x: (row[0] - letterbox.pad_x) / letterbox.scale,
            y: (row[1] - letterbox.pad_y) / letterbox.scale,
            width: row[2] / letterbox.scale,
            height: row[3] / letterbox.scale,
        };

        let scores: HashMap<String, f32> = SCORE_LABELS
            .iter()
            .zip(&row[5..5 + SCORE_LABELS.len()])
            .map(|(&label, &value)| (label.to_string(), value))
            .collect();

        detections.push(RawDetection { region, scores });
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_letterbox() -> Letterbox {
        Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 }
    }

    fn row(x: f32, y: f32, w: f32, h: f32, conf: f32, scores: [f32; 7]) -> Vec<f32> {
        let mut out = vec![x, y, w, h, conf];
        out.extend_from_slice(&scores);
        out
    }

    #[test]
    fn test_decode_skips_low_confidence_rows() {
        let mut rows = row(0.0, 0.0, 10.0, 10.0, 0.3, [0.0; 7]);
        rows.extend(row(5.0, 5.0, 20.0, 20.0, 0.9, [0.0; 7]));

        let detections = decode_rows(&rows, &identity_letterbox(), 0.5);
        assert_eq!(detections.len(), 1);
        assert!((detections[0].region.width - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_maps_scores_by_label() {
        let rows = row(0.0, 0.0, 10.0, 10.0, 0.9, [0.1, 0.8, 0.0, 0.0, 0.0, 0.0, 0.05]);
        let detections = decode_rows(&rows, &identity_letterbox(), 0.5);
        let scores = &detections[0].scores;
        assert!((scores["neutral"] - 0.1).abs() < 1e-6);
        assert!((scores["happy"] - 0.8).abs() < 1e-6);
        assert!((scores["surprised"] - 0.05).abs() < 1e-6);
        assert_eq!(scores.len(), 7);
    }

    #[test]
    fn test_decode_unletterboxes_coordinates() {
        // Model space scaled by 0.5 with 50px of vertical letterbox padding.
        let letterbox = Letterbox { scale: 0.5, pad_x: 0.0, pad_y: 50.0 };
        let rows = row(100.0, 100.0, 40.0, 20.0, 0.9, [0.0; 7]);

        let detections = decode_rows(&rows, &letterbox, 0.5);
        let region = detections[0].region;
        assert!((region.x - 200.0).abs() < 1e-4);
        assert!((region.y - 100.0).abs() < 1e-4);
        assert!((region.width - 80.0).abs() < 1e-4);
        assert!((region.height - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_ignores_trailing_partial_row() {
        let mut rows = row(0.0, 0.0, 10.0, 10.0, 0.9, [0.0; 7]);
        rows.extend([1.0, 2.0, 3.0]); // truncated row
        let detections = decode_rows(&rows, &identity_letterbox(), 0.5);
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn test_preprocess_shape_and_letterbox() {
        let width = 64usize;
        let height = 32usize;
        let gray = vec![128u8; width * height];
        let (tensor, letterbox) = preprocess_frame(EXPRESSION_INPUT_SIZE, &gray, width, height);

        assert_eq!(tensor.shape(), &[1, 3, EXPRESSION_INPUT_SIZE, EXPRESSION_INPUT_SIZE]);
        assert!((letterbox.scale - 5.0).abs() < 1e-6);
        assert!(letterbox.pad_x.abs() < 1e-6);
        assert!((letterbox.pad_y - 80.0).abs() < 1e-6);

        // Padding rows normalize to ~0; content rows carry the pixel value.
        let pad_val = tensor[[0, 0, 0, 0]];
        assert!(pad_val.abs() < 1e-3, "pad should normalize to ~0, got {pad_val}");
        let content_val = tensor[[0, 0, EXPRESSION_INPUT_SIZE / 2, EXPRESSION_INPUT_SIZE / 2]];
        let expected = (128.0 - EXPRESSION_MEAN) / EXPRESSION_STD;
        assert!((content_val - expected).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_channels_identical() {
        let gray = vec![90u8; 16 * 16];
        let (tensor, _) = preprocess_frame(32, &gray, 16, 16);
        for y in 0..32 {
            for x in 0..32 {
                assert_eq!(tensor[[0, 0, y, x]], tensor[[0, 1, y, x]]);
                assert_eq!(tensor[[0, 1, y, x]], tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_sample_bilinear_interpolates() {
        // 2x1 image [0, 255]: midpoint samples halfway.
        let gray = vec![0u8, 255u8];
        let mid = sample_bilinear(&gray, 2, 1, 0.5, 0.0);
        assert!((mid - 127.5).abs() < 1e-3);
    }

    #[test]
    fn test_detect_before_load_is_not_ready() {
        let mut net = ExpressionNet::new();
        assert!(!net.is_ready());
        let result = net.detect(&[0u8; 4], 2, 2);
        assert!(matches!(result, Err(DetectError::NotReady)));
    }

    #[test]
    fn test_load_missing_model_is_descriptive_and_retryable() {
        let mut net = ExpressionNet::new();
        let err = net.load("/nonexistent/expression.onnx").unwrap_err();
        assert!(matches!(err, ClassifierError::ModelNotFound(_)));
        // Still unloaded: a retry is possible and detection still rejects.
        assert!(!net.is_ready());
        assert!(matches!(net.detect(&[0u8; 4], 2, 2), Err(DetectError::NotReady)));
    }
}
