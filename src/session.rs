//! Camera sessions and the detection result channel.
//!
//! - `ResultSlot`: single-slot, last-write-wins channel from the detection worker to
//!   the render path. Publishing swaps in a whole `Arc<DetectionResult>`; results
//!   stamped with anything but the active `SessionId` are refused.
//! - `CameraSession`: one camera's frame path. Owns the gate and a worker thread
//!   that drives the detector adapter. `offer_frame` never blocks.
//! - `Pipeline`: the application-facing orchestrator. Owns the registry, the slot,
//!   the state record, and the current session; handles camera switches and
//!   teardown.
//!
//! Teardown order matters: the slot is deactivated before the old session stops,
//! so an in-flight call from the old camera can finish but cannot publish.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::detect::{
    AdapterConfig, BackendRegistry, DetectionResult, DetectorAdapter, DetectorBackend,
    UnavailableBackend,
};
use crate::frame::Frame;
use crate::geometry::{
    CameraFacing, CoordinateTransformer, FitMode, MirrorPolicy, PreviewGeometry, Rotation, Size,
    TransformedBox,
};
use crate::ingest::CameraSource;
use crate::overlay::{EffectKind, Intensity, OverlayPlan};
use crate::state::{CameraStatus, StateCell, UiState};
use crate::throttle::{DetectionGate, DetectionPermit, GateStats, DEFAULT_THROTTLE_INTERVAL};

// ----------------------------------------------------------------------------
// SessionId
// ----------------------------------------------------------------------------

/// Random per-session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn random() -> Self {
        SessionId(rand::random())
    }

    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

// ----------------------------------------------------------------------------
// ResultSlot
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SlotState {
    active: Option<SessionId>,
    latest: Option<Arc<DetectionResult>>,
    published: u64,
    rejected: u64,
}

/// Last known detection result, shared between the worker and the render path.
#[derive(Debug, Default)]
pub struct ResultSlot {
    state: Mutex<SlotState>,
}

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept results from `session` only, discarding whatever is stored.
    pub fn activate(&self, session: SessionId) {
        let mut state = self.lock();
        state.active = Some(session);
        state.latest = None;
    }

    /// Refuse all results and clear the stored one.
    pub fn deactivate(&self) {
        let mut state = self.lock();
        state.active = None;
        state.latest = None;
    }

    /// Replace the stored result. Returns false if `result` belongs to a
    /// superseded session.
    pub fn publish(&self, result: DetectionResult) -> bool {
        let mut state = self.lock();
        if state.active != Some(result.session) {
            state.rejected += 1;
            return false;
        }
        state.latest = Some(Arc::new(result));
        state.published += 1;
        true
    }

    pub fn latest(&self) -> Option<Arc<DetectionResult>> {
        self.lock().latest.clone()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.lock().active
    }

    /// (published, rejected) counts since creation.
    pub fn counts(&self) -> (u64, u64) {
        let state = self.lock();
        (state.published, state.rejected)
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// FpsCounter
// ----------------------------------------------------------------------------

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Events per second over a sliding one-second window.
#[derive(Debug, Default)]
pub struct FpsCounter {
    ticks: VecDeque<Instant>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, now: Instant) {
        self.ticks.push_back(now);
        self.evict(now);
    }

    pub fn rate(&mut self, now: Instant) -> f32 {
        self.evict(now);
        self.ticks.len() as f32 / FPS_WINDOW.as_secs_f32()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.ticks.front() {
            if now.saturating_duration_since(oldest) >= FPS_WINDOW {
                self.ticks.pop_front();
            } else {
                break;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// CameraSession
// ----------------------------------------------------------------------------

/// What happened to an offered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Handed to the detection worker.
    Forwarded,
    /// Throttled or a detection is in flight; preview only.
    Skipped,
    /// The frame came from a camera other than the session's.
    WrongCamera,
    /// No running session.
    Closed,
}

struct Job {
    frame: Arc<Frame>,
    permit: DetectionPermit,
}

pub struct CameraSession {
    id: SessionId,
    facing: CameraFacing,
    gate: DetectionGate,
    jobs: Option<mpsc::SyncSender<Job>>,
}

impl CameraSession {
    /// Start a session: spawn the detector adapter and the worker feeding it.
    pub fn start(
        id: SessionId,
        facing: CameraFacing,
        backend: Box<dyn DetectorBackend>,
        adapter_config: AdapterConfig,
        gate: DetectionGate,
        slot: Arc<ResultSlot>,
    ) -> Result<Self> {
        let mut adapter = DetectorAdapter::spawn(backend, adapter_config)?;
        let (jobs_tx, jobs_rx) = mpsc::sync_channel::<Job>(1);

        thread::Builder::new()
            .name(format!("facecloak-session-{}", id))
            .spawn(move || {
                while let Ok(Job { frame, permit }) = jobs_rx.recv() {
                    let outcome = adapter.detect(Arc::clone(&frame));
                    let result = DetectionResult {
                        session: id,
                        frame_sequence: frame.sequence(),
                        frame_size: frame.size(),
                        rotation: frame.rotation(),
                        facing: frame.facing(),
                        outcome,
                        captured_at: frame.captured_at(),
                    };
                    drop(frame);
                    if !slot.publish(result) {
                        log::debug!("session {}: result discarded (session superseded)", id);
                    }
                    permit.finish();
                }
                adapter.release();
                log::debug!("session {} worker stopped", id);
            })
            .context("failed to spawn session worker")?;

        log::info!("session {} started ({} camera)", id, facing);
        Ok(Self {
            id,
            facing,
            gate,
            jobs: Some(jobs_tx),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn gate(&self) -> &DetectionGate {
        &self.gate
    }

    pub fn is_accepting(&self) -> bool {
        self.jobs.is_some()
    }

    /// Offer a frame observed at `now`. Never blocks.
    pub fn offer_frame(&self, frame: Arc<Frame>, now: Instant) -> FrameDisposition {
        let Some(jobs) = self.jobs.as_ref() else {
            return FrameDisposition::Closed;
        };
        if frame.facing() != self.facing {
            return FrameDisposition::WrongCamera;
        }
        let Some(permit) = self.gate.try_admit(now) else {
            return FrameDisposition::Skipped;
        };
        match jobs.try_send(Job { frame, permit }) {
            Ok(()) => FrameDisposition::Forwarded,
            // The permit inside the returned job is dropped here, freeing the gate.
            Err(TrySendError::Full(_)) => FrameDisposition::Skipped,
            Err(TrySendError::Disconnected(_)) => FrameDisposition::Closed,
        }
    }

    /// Stop accepting frames. Any in-flight detection finishes on the worker, which
    /// then releases the detector. Does not block.
    pub fn stop(&mut self) {
        if self.jobs.take().is_some() {
            log::info!("session {} stopped", self.id);
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub throttle: Duration,
    pub adapter: AdapterConfig,
    /// Backend name; `None` uses the registry default.
    pub backend: Option<String>,
    pub mirror: MirrorPolicy,
    pub fit: FitMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE_INTERVAL,
            adapter: AdapterConfig::default(),
            backend: None,
            mirror: MirrorPolicy::default(),
            fit: FitMode::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineStats {
    pub session: Option<SessionId>,
    pub gate: GateStats,
    pub frames_per_sec: f32,
    pub results_published: u64,
    pub results_rejected: u64,
}

/// Face overlay pipeline: Source -> Gate -> Detector -> Transform -> Overlay.
pub struct Pipeline {
    registry: Arc<BackendRegistry>,
    config: PipelineConfig,
    transformer: CoordinateTransformer,
    slot: Arc<ResultSlot>,
    state: Arc<StateCell>,
    session: Option<CameraSession>,
    frame_rate: FpsCounter,
}

impl Pipeline {
    pub fn new(registry: Arc<BackendRegistry>, config: PipelineConfig, initial: UiState) -> Self {
        let transformer = CoordinateTransformer::new(config.mirror);
        Self {
            registry,
            config,
            transformer,
            slot: Arc::new(ResultSlot::new()),
            state: Arc::new(StateCell::new(initial)),
            session: None,
            frame_rate: FpsCounter::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<UiState> {
        self.state.load()
    }

    /// Shared handle for render threads.
    pub fn result_slot(&self) -> Arc<ResultSlot> {
        Arc::clone(&self.slot)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(CameraSession::id)
    }

    /// Start a session for the camera named in the state record. A session that
    /// is already running is replaced.
    pub fn start(&mut self) -> Result<SessionId> {
        self.stop_session();

        let facing = self.state.load().facing;
        let backend = self.create_backend();
        let id = SessionId::random();
        self.slot.activate(id);
        let session = CameraSession::start(
            id,
            facing,
            backend,
            self.config.adapter,
            DetectionGate::new(self.config.throttle),
            Arc::clone(&self.slot),
        );
        match session {
            Ok(session) => {
                self.session = Some(session);
                Ok(id)
            }
            Err(e) => {
                self.slot.deactivate();
                Err(e)
            }
        }
    }

    /// Tear down the current session and start one for `facing`.
    pub fn switch_camera(&mut self, facing: CameraFacing) -> Result<SessionId> {
        self.stop_session();
        self.state.update(|s| s.with_facing(facing));
        log::info!("switching to {} camera", facing);
        self.start()
    }

    /// Stop the session and release the detector. Does not wait for an in-flight
    /// detection.
    pub fn shutdown(&mut self) {
        self.stop_session();
    }

    /// Offer a camera frame. Frames not forwarded still feed the live preview.
    pub fn offer_frame(&mut self, frame: Arc<Frame>, now: Instant) -> FrameDisposition {
        self.frame_rate.tick(now);
        match &self.session {
            Some(session) => session.offer_frame(frame, now),
            None => FrameDisposition::Closed,
        }
    }

    pub fn set_effect_enabled(&self, enabled: bool) -> Arc<UiState> {
        self.state.update(|s| s.with_effect_enabled(enabled))
    }

    pub fn set_effect_kind(&self, kind: EffectKind) -> Arc<UiState> {
        self.state.update(|s| s.with_effect_kind(kind))
    }

    pub fn set_intensity(&self, intensity: Intensity) -> Arc<UiState> {
        self.state.update(|s| s.with_intensity(intensity))
    }

    pub fn set_camera_status(&self, status: CameraStatus) -> Arc<UiState> {
        if status.is_error() {
            log::warn!("camera status: {:?}", status);
        }
        self.state.update(|s| s.with_camera(status))
    }

    /// Open the camera through `open`, retrying up to `retries` more times after a
    /// permission or hardware failure. Each failure is published as the camera
    /// status, and each retry returns the status to `Starting` first.
    pub fn acquire_camera<F>(
        &self,
        retries: u32,
        pause: Duration,
        mut open: F,
    ) -> Result<CameraSource>
    where
        F: FnMut() -> Result<CameraSource>,
    {
        let mut attempt = 0;
        loop {
            match open() {
                Ok(source) => {
                    self.set_camera_status(CameraStatus::Running);
                    return Ok(source);
                }
                Err(e) => {
                    let status = CameraStatus::from_acquire_error(&e);
                    self.set_camera_status(status.clone());
                    let retry = status.retry().filter(|_| attempt < retries);
                    let Some(starting) = retry else {
                        return Err(e.context(match status {
                            CameraStatus::PermissionDenied => "camera permission denied",
                            _ => "camera unavailable",
                        }));
                    };
                    attempt += 1;
                    log::info!("retrying camera acquisition ({}/{})", attempt, retries);
                    thread::sleep(pause);
                    self.set_camera_status(starting);
                }
            }
        }
    }

    /// Preview rectangle for a camera buffer of `native` size on `screen`. Quarter-
    /// turned buffers are displayed portrait-relative.
    pub fn preview_geometry(&self, native: Size, rotation: Rotation, screen: Size) -> PreviewGeometry {
        if rotation.is_quarter_turn() {
            PreviewGeometry::fit_camera(native, screen, self.config.fit)
        } else {
            PreviewGeometry::fit(native, screen, self.config.fit)
        }
    }

    pub fn latest_result(&self) -> Option<Arc<DetectionResult>> {
        self.slot.latest()
    }

    /// Boxes of the current session's last result, placed against `preview`.
    pub fn render_boxes(&self, preview: &PreviewGeometry) -> Vec<TransformedBox> {
        let Some(result) = self.slot.latest() else {
            return Vec::new();
        };
        self.transformer.transform_visible(
            result.boxes(),
            result.frame_size,
            result.rotation,
            result.facing,
            preview,
        )
    }

    /// Draw commands for the current state and preview.
    pub fn overlay_plan(&self, preview: &PreviewGeometry) -> OverlayPlan {
        let state = self.state.load();
        if !state.effect.enabled {
            return OverlayPlan::default();
        }
        OverlayPlan::build(&self.render_boxes(preview), &state.effect)
    }

    /// Whether the preview of a frame from the current camera is displayed mirrored.
    pub fn mirrors_preview(&self, frame: &Frame) -> bool {
        self.transformer
            .mirror_policy()
            .should_mirror(frame.facing(), frame.size().is_landscape())
    }

    pub fn stats(&mut self, now: Instant) -> PipelineStats {
        let (results_published, results_rejected) = self.slot.counts();
        PipelineStats {
            session: self.session_id(),
            gate: self
                .session
                .as_ref()
                .map(|s| s.gate().stats())
                .unwrap_or_default(),
            frames_per_sec: self.frame_rate.rate(now),
            results_published,
            results_rejected,
        }
    }

    fn stop_session(&mut self) {
        self.slot.deactivate();
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    fn create_backend(&self) -> Box<dyn DetectorBackend> {
        let created = match self.config.backend.as_deref() {
            Some(name) => self.registry.create(name),
            None => self.registry.create_default(),
        };
        created.unwrap_or_else(|e| {
            log::warn!("detector unavailable, rendering without faces: {:#}", e);
            Box::new(UnavailableBackend::new(format!("{:#}", e)))
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionOutcome;
    use crate::geometry::DetectedBox;

    fn result_for(session: SessionId, seq: u64) -> DetectionResult {
        DetectionResult {
            session,
            frame_sequence: seq,
            frame_size: Size::new(100.0, 100.0),
            rotation: Rotation::Deg0,
            facing: CameraFacing::Back,
            outcome: DetectionOutcome::Faces(vec![DetectedBox::new(10.0, 10.0, 30.0, 30.0)]),
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn slot_refuses_superseded_sessions() {
        let slot = ResultSlot::new();
        let old = SessionId::from_raw(1);
        let new = SessionId::from_raw(2);
        slot.activate(old);
        assert!(slot.publish(result_for(old, 1)));
        slot.activate(new);
        assert!(slot.latest().is_none());
        assert!(!slot.publish(result_for(old, 2)));
        assert!(slot.publish(result_for(new, 3)));
        assert_eq!(slot.latest().unwrap().frame_sequence, 3);
        assert_eq!(slot.counts(), (2, 1));
    }

    #[test]
    fn deactivated_slot_refuses_everything() {
        let slot = ResultSlot::new();
        let id = SessionId::from_raw(9);
        slot.activate(id);
        slot.deactivate();
        assert!(!slot.publish(result_for(id, 1)));
        assert!(slot.latest().is_none());
    }

    #[test]
    fn fps_counter_uses_sliding_window() {
        let base = Instant::now();
        let mut fps = FpsCounter::new();
        for i in 0..10 {
            fps.tick(base + Duration::from_millis(i * 100));
        }
        assert_eq!(fps.rate(base + Duration::from_millis(950)), 10.0);
        assert_eq!(fps.rate(base + Duration::from_millis(1450)), 5.0);
    }

    #[test]
    fn session_id_displays_as_hex() {
        assert_eq!(SessionId::from_raw(255).to_string(), "00000000000000ff");
    }
}
