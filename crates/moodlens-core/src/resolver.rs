//! Stateful resolver: carries smoothing history across detection cycles.
//!
//! The resolver is the single owner of the previous-result reference. It is
//! only ever driven from the engine loop, one observation at a time, so no
//! synchronization is needed.

use crate::emotion::{dominant_emotion, smooth_result, EmotionProbabilities, EmotionResult, SmoothingLevel};

/// Turns per-cycle probability vectors into smoothed [`EmotionResult`]s.
#[derive(Debug, Clone)]
pub struct EmotionResolver {
    alpha: f32,
    previous: Option<EmotionResult>,
}

impl EmotionResolver {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, previous: None }
    }

    pub fn with_level(level: SmoothingLevel) -> Self {
        Self::new(level.alpha())
    }

    /// Retune the smoothing weight. History is kept: a settings change
    /// mid-stream should not cause a visible discontinuity.
    pub fn set_level(&mut self, level: SmoothingLevel) {
        self.alpha = level.alpha();
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Resolve one cycle's probabilities into a smoothed result and retain
    /// it as the next cycle's smoothing input.
    pub fn observe(&mut self, probabilities: EmotionProbabilities) -> EmotionResult {
        let current = dominant_emotion(probabilities);
        let smoothed = smooth_result(current, self.previous.as_ref(), self.alpha);
        self.previous = Some(smoothed.clone());
        smoothed
    }

    /// Clear smoothing history. Called on every no-face cycle so a
    /// detection gap never blends a reappearing face against a stale
    /// baseline.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_history(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;

    fn happy_reading() -> EmotionProbabilities {
        EmotionProbabilities {
            happy: 0.9,
            ..Default::default()
        }
    }

    fn sad_reading() -> EmotionProbabilities {
        EmotionProbabilities {
            sad: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_observation_unsmoothed() {
        let mut resolver = EmotionResolver::new(0.7);
        let result = resolver.observe(happy_reading());
        assert_eq!(result.emotion, Emotion::Happy);
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_history_compounds_across_cycles() {
        let mut resolver = EmotionResolver::new(0.7);
        resolver.observe(happy_reading());
        let second = resolver.observe(sad_reading());
        // happy: 0*(0.3) + 0.9*0.7 = 0.63; sad: 0.9*0.3 = 0.27
        assert!((second.probabilities.happy - 0.63).abs() < 1e-6);
        assert!((second.probabilities.sad - 0.27).abs() < 1e-6);
        assert_eq!(second.emotion, Emotion::Happy);

        // Third cycle smooths against the *smoothed* second result.
        let third = resolver.observe(sad_reading());
        assert!((third.probabilities.happy - 0.63 * 0.7).abs() < 1e-6);
        assert!((third.probabilities.sad - (0.9 * 0.3 + 0.27 * 0.7)).abs() < 1e-6);
    }

    #[test]
    fn test_reset_on_loss_prevents_stale_blend() {
        // [face, no face, face]: the third reading must not be smoothed
        // against the first.
        let mut resolver = EmotionResolver::new(0.95);
        resolver.observe(happy_reading());
        resolver.reset();
        assert!(!resolver.has_history());

        let reappeared = resolver.observe(sad_reading());
        assert_eq!(reappeared.emotion, Emotion::Sad);
        assert!((reappeared.probabilities.sad - 0.9).abs() < 1e-6);
        assert!(reappeared.probabilities.happy.abs() < 1e-6);
    }

    #[test]
    fn test_set_level_keeps_history() {
        let mut resolver = EmotionResolver::with_level(SmoothingLevel::High);
        resolver.observe(happy_reading());
        resolver.set_level(SmoothingLevel::Low);
        assert!(resolver.has_history());
        let result = resolver.observe(sad_reading());
        // alpha now 0.3: happy = 0.9*0.3 = 0.27, sad = 0.9*0.7 = 0.63
        assert!((result.probabilities.sad - 0.63).abs() < 1e-6);
        assert_eq!(result.emotion, Emotion::Sad);
    }
}
