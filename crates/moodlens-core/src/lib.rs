//! moodlens-core — Emotion resolution pipeline.
//!
//! Wraps a pretrained facial-expression model (ONNX Runtime) behind a
//! perception adapter, resolves dominant emotion and coarse mood from the
//! normalized probability vector, and applies exponential temporal smoothing
//! across detection cycles.

pub mod adapter;
pub mod classifier;
pub mod emotion;
pub mod resolver;

pub use adapter::{DetectError, ExpressionDetector, FaceBox, FaceObservation, PerceptionAdapter};
pub use classifier::{ClassifierError, ExpressionNet};
pub use emotion::{
    dominant_emotion, percent, smooth_result, Emotion, EmotionProbabilities, EmotionResult, Mood,
    SmoothingLevel,
};
pub use resolver::EmotionResolver;
