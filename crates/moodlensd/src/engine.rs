//! Detection loop on a dedicated engine thread.
//!
//! The thread exclusively owns the camera, the perception adapter, and the
//! resolver, so capture, inference, and resolution are strictly sequential
//! within one iteration — no locking anywhere. Each iteration drains control
//! commands, runs one inference cycle if the throttle interval has elapsed,
//! publishes the outcome over a watch channel, and sleeps out the remainder
//! of the frame budget (the loop's one suspension point).

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use moodlens_core::{
    DetectError, EmotionResolver, EmotionResult, ExpressionNet, FaceBox, PerceptionAdapter,
    SmoothingLevel,
};
use moodlens_hw::{Camera, CameraError, CaptureSession};

use crate::config::Config;

/// Pacing budget for one loop iteration (display-refresh analog).
const FRAME_INTERVAL: Duration = Duration::from_millis(33);
/// Below this average brightness, expression scores are unreliable.
const LOW_LIGHT_BRIGHTNESS: f32 = 24.0;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("classifier error: {0}")]
    Classifier(#[from] moodlens_core::ClassifierError),
}

/// Outcome of one completed inference cycle, published to all consumers.
#[derive(Debug, Clone, Serialize)]
pub struct CycleUpdate {
    pub sequence: u64,
    pub face_detected: bool,
    /// `None` on a no-face cycle.
    pub result: Option<EmotionResult>,
    /// Selected face region, for overlay rendering.
    pub face: Option<FaceBox>,
}

enum EngineCommand {
    SetSmoothing(SmoothingLevel),
    Stop,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    updates: watch::Receiver<Option<CycleUpdate>>,
}

impl EngineHandle {
    /// Subscribe to per-cycle updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<CycleUpdate>> {
        self.updates.clone()
    }

    /// Latest completed cycle, if any.
    pub fn latest(&self) -> Option<CycleUpdate> {
        self.updates.borrow().clone()
    }

    /// Retune the smoothing preset without restarting the loop.
    pub async fn set_smoothing(&self, level: SmoothingLevel) -> bool {
        self.commands
            .send(EngineCommand::SetSmoothing(level))
            .await
            .is_ok()
    }

    /// Ask the engine thread to exit. The thread releases the camera and
    /// its channels when the loop returns.
    pub async fn stop(&self) {
        let _ = self.commands.send(EngineCommand::Stop).await;
    }
}

/// Open the camera, load the expression model, and start the loop on a
/// dedicated OS thread. Fails fast if either resource is unavailable.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let mut net = ExpressionNet::new();
    net.load(&config.model_path())?;
    tracing::info!(path = %config.model_path(), "expression model loaded");

    let adapter = PerceptionAdapter::new(net);
    let resolver = EmotionResolver::with_level(config.smoothing);
    let throttle = Throttle::new(Duration::from_millis(config.throttle_ms));

    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>(4);
    let (update_tx, update_rx) = watch::channel::<Option<CycleUpdate>>(None);

    std::thread::Builder::new()
        .name("moodlens-engine".into())
        .spawn(move || run_loop(camera, adapter, resolver, throttle, cmd_rx, update_tx))
        .expect("failed to spawn engine thread");

    Ok(EngineHandle {
        commands: cmd_tx,
        updates: update_rx,
    })
}

fn run_loop(
    camera: Camera,
    mut adapter: PerceptionAdapter<ExpressionNet>,
    mut resolver: EmotionResolver,
    mut throttle: Throttle,
    mut commands: mpsc::Receiver<EngineCommand>,
    updates: watch::Sender<Option<CycleUpdate>>,
) {
    tracing::info!("engine thread started");

    let mut session = match camera.stream() {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "failed to start capture stream");
            return;
        }
    };

    let mut sequence = 0u64;

    loop {
        let tick_start = Instant::now();

        // Drain pending control commands before doing any work.
        loop {
            match commands.try_recv() {
                Ok(EngineCommand::SetSmoothing(level)) => {
                    tracing::info!(?level, "smoothing preset changed");
                    resolver.set_level(level);
                }
                Ok(EngineCommand::Stop) => {
                    tracing::info!("engine thread stopping");
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    tracing::info!("engine handle dropped; exiting");
                    return;
                }
            }
        }

        if updates.is_closed() {
            tracing::info!("all subscribers gone; exiting");
            return;
        }

        // Skip work, not time: a tick inside the throttle window only
        // reschedules.
        if throttle.ready(Instant::now()) {
            let update = run_cycle(&mut session, &mut adapter, &mut resolver, sequence);
            sequence += 1;
            let _ = updates.send(Some(update));
        }

        let elapsed = tick_start.elapsed();
        if elapsed < FRAME_INTERVAL {
            std::thread::sleep(FRAME_INTERVAL - elapsed);
        }
    }
}

/// One capture → adapt → resolve cycle. Capture and detection failures are
/// logged and degrade to a no-face outcome; the loop never stops for them.
fn run_cycle(
    session: &mut CaptureSession<'_>,
    adapter: &mut PerceptionAdapter<ExpressionNet>,
    resolver: &mut EmotionResolver,
    sequence: u64,
) -> CycleUpdate {
    let no_face = |resolver: &mut EmotionResolver| {
        // A gap in detection resets smoothing so a reappearing face is not
        // blended against a stale baseline.
        resolver.reset();
        CycleUpdate {
            sequence,
            face_detected: false,
            result: None,
            face: None,
        }
    };

    let frame = match session.next_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "capture failed; treating as no face this cycle");
            return no_face(resolver);
        }
    };

    let brightness = frame.avg_brightness();
    if brightness < LOW_LIGHT_BRIGHTNESS {
        tracing::debug!(brightness, "low-light frame; expression scores may be unreliable");
    }

    match adapter.observe(&frame.data, frame.width, frame.height) {
        Ok(Some(observation)) => {
            let result = resolver.observe(observation.probabilities);
            tracing::debug!(
                emotion = %result.emotion,
                confidence = result.confidence,
                mood = %result.mood,
                "cycle resolved"
            );
            CycleUpdate {
                sequence,
                face_detected: true,
                result: Some(result),
                face: Some(observation.region),
            }
        }
        Ok(None) => no_face(resolver),
        Err(DetectError::NotReady) => {
            tracing::debug!("expression model not ready; skipping cycle");
            no_face(resolver)
        }
        Err(e) => {
            tracing::warn!(error = %e, "detection failed; treating as no face this cycle");
            no_face(resolver)
        }
    }
}

/// Minimum-gap gate between inference cycles. `ready` either claims the
/// current instant or leaves the previous claim untouched, so skipped ticks
/// never shift the schedule.
struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
