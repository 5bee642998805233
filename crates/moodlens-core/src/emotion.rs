//! Emotion categories, mood mapping, and temporal smoothing.
//!
//! Everything in this module is a total pure function: there are no error
//! conditions and no shared state. The stateful wrapper that carries
//! smoothing history across cycles lives in [`crate::resolver`].

use serde::{Deserialize, Serialize};

/// The seven expression categories produced by the expression net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Neutral,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
}

impl Emotion {
    /// Canonical iteration order. Dominant-emotion selection and ranking
    /// walk this array, so exact probability ties resolve in favor of the
    /// earlier category (later equal values are not *strictly* greater).
    pub const ALL: [Emotion; 7] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Fearful,
        Emotion::Disgusted,
    ];

    /// Lowercase wire name, matching the raw score-map keys.
    pub fn name(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Neutral => "neutral",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
        }
    }

    /// Capitalized display label.
    pub fn label(self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Neutral => "Neutral",
            Emotion::Angry => "Angry",
            Emotion::Surprised => "Surprised",
            Emotion::Fearful => "Fearful",
            Emotion::Disgusted => "Disgusted",
        }
    }

    /// Coarse mood category for this emotion.
    ///
    /// Happy/Surprised → positive (energetic, uplifted);
    /// Sad/Fearful/Disgusted → negative (distressed, uncomfortable);
    /// Neutral → neutral (baseline); Angry → alert (high arousal).
    pub fn mood(self) -> Mood {
        match self {
            Emotion::Happy | Emotion::Surprised => Mood::Positive,
            Emotion::Sad | Emotion::Fearful | Emotion::Disgusted => Mood::Negative,
            Emotion::Neutral => Mood::Neutral,
            Emotion::Angry => Mood::Alert,
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Four-way coarse mood classification, derived only from the dominant
/// emotion. Mood is never smoothed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Positive,
    Negative,
    Neutral,
    Alert,
}

impl Mood {
    /// Capitalized display label.
    pub fn label(self) -> &'static str {
        match self {
            Mood::Positive => "Positive",
            Mood::Negative => "Negative",
            Mood::Neutral => "Neutral",
            Mood::Alert => "Alert",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mood::Positive => f.write_str("positive"),
            Mood::Negative => f.write_str("negative"),
            Mood::Neutral => f.write_str("neutral"),
            Mood::Alert => f.write_str("alert"),
        }
    }
}

/// Confidence per emotion category, each in [0, 1].
///
/// All seven fields are always present. The values are independent
/// confidences and are not required to sum to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionProbabilities {
    pub happy: f32,
    pub sad: f32,
    pub neutral: f32,
    pub angry: f32,
    pub surprised: f32,
    pub fearful: f32,
    pub disgusted: f32,
}

impl EmotionProbabilities {
    pub fn get(&self, emotion: Emotion) -> f32 {
        match emotion {
            Emotion::Happy => self.happy,
            Emotion::Sad => self.sad,
            Emotion::Neutral => self.neutral,
            Emotion::Angry => self.angry,
            Emotion::Surprised => self.surprised,
            Emotion::Fearful => self.fearful,
            Emotion::Disgusted => self.disgusted,
        }
    }

    pub fn set(&mut self, emotion: Emotion, value: f32) {
        match emotion {
            Emotion::Happy => self.happy = value,
            Emotion::Sad => self.sad = value,
            Emotion::Neutral => self.neutral = value,
            Emotion::Angry => self.angry = value,
            Emotion::Surprised => self.surprised = value,
            Emotion::Fearful => self.fearful = value,
            Emotion::Disgusted => self.disgusted = value,
        }
    }
}

/// One resolved detection cycle. Recomputed every cycle and never mutated;
/// the previous result survives only as smoothing input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionResult {
    pub emotion: Emotion,
    /// Probability of the dominant category (the maximum of the seven).
    pub confidence: f32,
    pub mood: Mood,
    pub probabilities: EmotionProbabilities,
}

impl EmotionResult {
    /// All seven categories ranked by descending probability.
    ///
    /// `sort_by` is stable, so exact ties keep the canonical
    /// [`Emotion::ALL`] order.
    pub fn ranked(&self) -> [(Emotion, f32); 7] {
        let mut out = Emotion::ALL.map(|e| (e, self.probabilities.get(e)));
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Top three categories for narrative interpretation.
    pub fn top3(&self) -> [(Emotion, f32); 3] {
        let ranked = self.ranked();
        [ranked[0], ranked[1], ranked[2]]
    }
}

/// Round a [0, 1] confidence to an integer percentage for display.
pub fn percent(confidence: f32) -> u8 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Named smoothing presets exposed to the settings surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingLevel {
    /// Responsive, minimal smoothing.
    Low,
    /// Balanced.
    #[default]
    Medium,
    /// Stable, heavy smoothing with noticeable lag.
    High,
}

impl SmoothingLevel {
    /// EMA weight given to the previous result.
    pub fn alpha(self) -> f32 {
        match self {
            SmoothingLevel::Low => 0.3,
            SmoothingLevel::Medium => 0.7,
            SmoothingLevel::High => 0.95,
        }
    }
}

impl std::str::FromStr for SmoothingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(SmoothingLevel::Low),
            "medium" => Ok(SmoothingLevel::Medium),
            "high" => Ok(SmoothingLevel::High),
            other => Err(format!("unknown smoothing level: {other} (expected low, medium, or high)")),
        }
    }
}

/// Select the dominant emotion from a probability distribution.
///
/// Walks [`Emotion::ALL`] with a running maximum that starts at 0.0 and a
/// strictly-greater comparison, so an all-zero vector falls back to neutral
/// and exact ties go to the earlier category. This tie-break is a pinned
/// policy, not an implementation accident.
pub fn dominant_emotion(probabilities: EmotionProbabilities) -> EmotionResult {
    let mut emotion = Emotion::Neutral;
    let mut confidence = 0.0f32;

    for candidate in Emotion::ALL {
        let p = probabilities.get(candidate);
        if p > confidence {
            confidence = p;
            emotion = candidate;
        }
    }

    EmotionResult {
        emotion,
        confidence,
        mood: emotion.mood(),
        probabilities,
    }
}

/// Blend the current result against the previous one with an exponential
/// moving average, then re-resolve dominant emotion and mood from the
/// blended vector.
///
/// `alpha` is the weight of the previous result: 0 returns the current
/// reading, 1 returns the previous one. With no previous result the current
/// reading passes through unchanged.
pub fn smooth_result(
    current: EmotionResult,
    previous: Option<&EmotionResult>,
    alpha: f32,
) -> EmotionResult {
    let Some(previous) = previous else {
        return current;
    };

    let mut blended = EmotionProbabilities::default();
    for emotion in Emotion::ALL {
        let value = current.probabilities.get(emotion) * (1.0 - alpha)
            + previous.probabilities.get(emotion) * alpha;
        blended.set(emotion, value);
    }

    // Categorical labels are never carried over: they are recomputed from
    // the smoothed distribution.
    dominant_emotion(blended)
}
