//! Detector adapter: runs an opaque backend off the caller's thread with a bounded
//! wait.
//!
//! The backend lives on a dedicated inference thread. `detect` sends the frame
//! over and waits up to the configured timeout. A response that arrives after its
//! caller gave up is recognised by its sequence number and discarded, so the
//! caller only ever sees the answer to the frame it asked about.
//!
//! Requests are processed strictly one at a time. While a call that timed out is
//! still running, `detect` answers `TimedOut` straight away without handing the
//! backend another frame, so a hung backend pins at most one frame.

use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::backend::DetectorBackend;
use super::result::DetectionOutcome;
use crate::frame::Frame;
use crate::geometry::DetectedBox;

/// Reference detector timeout.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Boxes smaller than this in either native dimension never reach the transform.
pub const DEFAULT_MIN_FACE_PX: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdapterConfig {
    pub timeout: Duration,
    pub min_face_px: f32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DETECT_TIMEOUT,
            min_face_px: DEFAULT_MIN_FACE_PX,
        }
    }
}

struct Request {
    seq: u64,
    frame: Arc<Frame>,
}

enum Reply {
    Boxes(Vec<DetectedBox>),
    Failed(anyhow::Error),
    NotReady,
}

struct Response {
    seq: u64,
    reply: Reply,
}

pub struct DetectorAdapter {
    backend_name: &'static str,
    config: AdapterConfig,
    requests: Option<mpsc::SyncSender<Request>>,
    responses: mpsc::Receiver<Response>,
    next_seq: u64,
    /// Sequence number of a timed-out call the backend has not answered yet.
    outstanding: Option<u64>,
}

impl DetectorAdapter {
    /// Move `backend` onto a new inference thread.
    pub fn spawn(backend: Box<dyn DetectorBackend>, config: AdapterConfig) -> Result<Self> {
        let backend_name = backend.name();
        let (request_tx, request_rx) = mpsc::sync_channel::<Request>(1);
        let (response_tx, response_rx) = mpsc::channel::<Response>();

        thread::Builder::new()
            .name(format!("facecloak-detect-{}", backend_name))
            .spawn(move || inference_loop(backend, request_rx, response_tx))
            .context("failed to spawn detector thread")?;

        log::debug!(
            "detector '{}' started (timeout {:?}, min face {}px)",
            backend_name,
            config.timeout,
            config.min_face_px
        );

        Ok(Self {
            backend_name,
            config,
            requests: Some(request_tx),
            responses: response_rx,
            next_seq: 0,
            outstanding: None,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn config(&self) -> AdapterConfig {
        self.config
    }

    /// Run detection on `frame`, blocking for at most the configured timeout.
    ///
    /// Never fails: timeouts, backend errors, and an uninitialized backend all come
    /// back as outcomes with no boxes.
    pub fn detect(&mut self, frame: Arc<Frame>) -> DetectionOutcome {
        let frame_sequence = frame.sequence();
        if self.requests.is_none() {
            return DetectionOutcome::Unavailable;
        }
        if !self.drain_late_replies() {
            return DetectionOutcome::Unavailable;
        }
        if let Some(stuck) = self.outstanding {
            log::debug!(
                "detector '{}' still busy with #{}; frame {} skipped",
                self.backend_name,
                stuck,
                frame_sequence
            );
            return DetectionOutcome::TimedOut;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let Some(requests) = self.requests.as_ref() else {
            return DetectionOutcome::Unavailable;
        };
        match requests.try_send(Request { seq, frame }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!(
                    "detector '{}' queue full; frame {} skipped",
                    self.backend_name,
                    frame_sequence
                );
                return DetectionOutcome::TimedOut;
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("detector '{}' thread is gone", self.backend_name);
                self.requests = None;
                return DetectionOutcome::Unavailable;
            }
        }

        let deadline = Instant::now() + self.config.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.seq == seq => {
                    return self.finish(frame_sequence, response.reply)
                }
                Ok(stale) => {
                    log::debug!(
                        "detector '{}': discarding late response #{}",
                        self.backend_name,
                        stale.seq
                    );
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "detector '{}' timed out after {:?} on frame {}",
                        self.backend_name,
                        self.config.timeout,
                        frame_sequence
                    );
                    self.outstanding = Some(seq);
                    return DetectionOutcome::TimedOut;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("detector '{}' thread exited", self.backend_name);
                    self.requests = None;
                    return DetectionOutcome::Unavailable;
                }
            }
        }
    }

    /// True while a timed-out call is still holding the backend.
    pub fn is_stalled(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Discard replies that arrived after their caller gave up. Returns false if
    /// the inference thread has exited.
    fn drain_late_replies(&mut self) -> bool {
        while self.outstanding.is_some() {
            match self.responses.try_recv() {
                Ok(late) => {
                    log::debug!(
                        "detector '{}': discarding late response #{}",
                        self.backend_name,
                        late.seq
                    );
                    if Some(late.seq) == self.outstanding {
                        self.outstanding = None;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("detector '{}' thread exited", self.backend_name);
                    self.requests = None;
                    self.outstanding = None;
                    return false;
                }
            }
        }
        true
    }

    /// Stop the inference thread once its current call (if any) returns. Does not
    /// wait for it.
    pub fn release(&mut self) {
        if self.requests.take().is_some() {
            log::debug!("detector '{}' released", self.backend_name);
        }
    }

    fn finish(&self, frame_sequence: u64, reply: Reply) -> DetectionOutcome {
        match reply {
            Reply::Boxes(boxes) => {
                let min = self.config.min_face_px;
                let boxes: Vec<DetectedBox> = boxes
                    .into_iter()
                    .filter(|b| b.is_finite() && b.meets_min_size(min))
                    .collect();
                if boxes.is_empty() {
                    DetectionOutcome::NoFaces
                } else {
                    DetectionOutcome::Faces(boxes)
                }
            }
            Reply::Failed(e) => {
                log::warn!(
                    "detector '{}' failed on frame {}: {:#}",
                    self.backend_name,
                    frame_sequence,
                    e
                );
                DetectionOutcome::Failed
            }
            Reply::NotReady => {
                log::debug!(
                    "detector '{}' not initialized; frame {} has no faces",
                    self.backend_name,
                    frame_sequence
                );
                DetectionOutcome::Unavailable
            }
        }
    }
}

impl Drop for DetectorAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

fn inference_loop(
    mut backend: Box<dyn DetectorBackend>,
    requests: mpsc::Receiver<Request>,
    responses: mpsc::Sender<Response>,
) {
    if let Err(e) = backend.warm_up() {
        log::warn!("detector '{}' warm-up failed: {:#}", backend.name(), e);
    }

    while let Ok(Request { seq, frame }) = requests.recv() {
        let reply = if !backend.is_ready() {
            Reply::NotReady
        } else {
            match frame.view().run_detector(backend.as_mut()) {
                Ok(boxes) => Reply::Boxes(boxes),
                Err(e) => Reply::Failed(e),
            }
        };
        drop(frame);
        if responses.send(Response { seq, reply }).is_err() {
            break;
        }
    }

    backend.release();
    log::debug!("detector '{}' thread stopped", backend.name());
}
