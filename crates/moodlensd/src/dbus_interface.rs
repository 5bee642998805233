use zbus::interface;
use zbus::object_server::SignalEmitter;

use moodlens_core::{percent, Emotion, SmoothingLevel};

use crate::engine::{CycleUpdate, EngineHandle};

pub const BUS_NAME: &str = "dev.moodlens.Moodlens1";
pub const OBJECT_PATH: &str = "/dev/moodlens/Moodlens1";

/// D-Bus surface for the Moodlens daemon.
///
/// Presentation layers subscribe to the `EmotionCycle` signal for the live
/// stream and poll `Current`/`Status` for snapshots.
pub struct MoodlensService {
    engine: EngineHandle,
    overlay: bool,
    advanced_stats: bool,
}

impl MoodlensService {
    pub fn new(engine: EngineHandle, overlay: bool, advanced_stats: bool) -> Self {
        Self {
            engine,
            overlay,
            advanced_stats,
        }
    }

    pub fn payload_for(&self, update: &CycleUpdate) -> String {
        render_payload(update, self.overlay, self.advanced_stats).to_string()
    }
}

#[interface(name = "dev.moodlens.Moodlens1")]
impl MoodlensService {
    /// Daemon status snapshot.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let latest = self.engine.latest();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "cycles_completed": latest.as_ref().map(|u| u.sequence + 1).unwrap_or(0),
            "face_detected": latest.as_ref().map(|u| u.face_detected).unwrap_or(false),
        })
        .to_string())
    }

    /// Latest completed cycle as JSON, or an empty object before the first
    /// cycle.
    async fn current(&self) -> zbus::fdo::Result<String> {
        match self.engine.latest() {
            Some(update) => Ok(self.payload_for(&update)),
            None => Ok("{}".to_string()),
        }
    }

    /// Change the smoothing preset (low/medium/high).
    async fn set_smoothing(&self, level: &str) -> zbus::fdo::Result<()> {
        let level: SmoothingLevel = level
            .parse()
            .map_err(|e: String| zbus::fdo::Error::InvalidArgs(e))?;
        tracing::info!(?level, "set_smoothing requested");
        if self.engine.set_smoothing(level).await {
            Ok(())
        } else {
            Err(zbus::fdo::Error::Failed("engine not running".into()))
        }
    }

    /// Emitted once per completed detection cycle.
    #[zbus(signal)]
    pub async fn emotion_cycle(
        emitter: &SignalEmitter<'_>,
        payload: String,
    ) -> zbus::Result<()>;
}

/// Render one cycle outcome as the published JSON payload.
///
/// `overlay` gates the face box; `advanced_stats` gates the per-category
/// percentage map. Those two booleans plus the smoothing preset are the
/// core's entire configuration surface.
pub fn render_payload(update: &CycleUpdate, overlay: bool, advanced_stats: bool) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "sequence": update.sequence,
        "face_detected": update.face_detected,
        "result": update.result,
    });

    if let Some(result) = &update.result {
        let top: Vec<serde_json::Value> = result
            .top3()
            .iter()
            .map(|(emotion, confidence)| {
                serde_json::json!({ "emotion": emotion, "confidence": confidence })
            })
            .collect();
        payload["top"] = serde_json::Value::from(top);

        if advanced_stats {
            let mut percentages = serde_json::Map::new();
            for emotion in Emotion::ALL {
                percentages.insert(
                    emotion.name().to_string(),
                    percent(result.probabilities.get(emotion)).into(),
                );
            }
            payload["percentages"] = serde_json::Value::Object(percentages);
        }
    }

    if overlay {
        if let Some(face) = &update.face {
            payload["face"] = serde_json::to_value(face).unwrap_or(serde_json::Value::Null);
        }
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodlens_core::{dominant_emotion, EmotionProbabilities, FaceBox};

    fn face_update() -> CycleUpdate {
        let probabilities = EmotionProbabilities {
            happy: 0.8,
            surprised: 0.15,
            neutral: 0.05,
            ..Default::default()
        };
        CycleUpdate {
            sequence: 7,
            face_detected: true,
            result: Some(dominant_emotion(probabilities)),
            face: Some(FaceBox { x: 10.0, y: 20.0, width: 100.0, height: 120.0 }),
        }
    }

    #[test]
    fn test_payload_includes_result_and_top3() {
        let payload = render_payload(&face_update(), false, false);
        assert_eq!(payload["sequence"], 7);
        assert_eq!(payload["face_detected"], true);
        assert_eq!(payload["result"]["emotion"], "happy");
        assert_eq!(payload["result"]["mood"], "positive");

        let top = payload["top"].as_array().unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0]["emotion"], "happy");
        assert_eq!(top[1]["emotion"], "surprised");
        assert_eq!(top[2]["emotion"], "neutral");

        // Gated fields stay out when disabled.
        assert!(payload.get("percentages").is_none());
        assert!(payload.get("face").is_none());
    }

    #[test]
    fn test_payload_advanced_stats_percentages() {
        let payload = render_payload(&face_update(), false, true);
        let percentages = payload["percentages"].as_object().unwrap();
        assert_eq!(percentages["happy"], 80);
        assert_eq!(percentages["surprised"], 15);
        assert_eq!(percentages["sad"], 0);
        assert_eq!(percentages.len(), 7);
    }

    #[test]
    fn test_payload_overlay_face_box() {
        let payload = render_payload(&face_update(), true, false);
        assert_eq!(payload["face"]["x"], 10.0);
        assert_eq!(payload["face"]["width"], 100.0);
    }

    #[test]
    fn test_payload_no_face_cycle() {
        let update = CycleUpdate {
            sequence: 3,
            face_detected: false,
            result: None,
            face: None,
        };
        let payload = render_payload(&update, true, true);
        assert_eq!(payload["face_detected"], false);
        assert!(payload["result"].is_null());
        assert!(payload.get("top").is_none());
        assert!(payload.get("percentages").is_none());
        assert!(payload.get("face").is_none());
    }
}
