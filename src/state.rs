//! User-facing state record.
//!
//! `UiState` is immutable: every control change (effect toggle, intensity slider,
//! camera switch, permission outcome) builds a new record, and `StateCell` swaps
//! it in with a single assignment. Readers hold an `Arc` snapshot and never see a
//! half-applied change.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::geometry::CameraFacing;
use crate::ingest::AcquireError;
use crate::overlay::{EffectKind, EffectSettings, Intensity};

/// Camera acquisition state. The error variants are the only failures surfaced to
/// the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CameraStatus {
    #[default]
    Starting,
    Running,
    PermissionDenied,
    Unavailable(String),
}

impl CameraStatus {
    /// Map a failed acquisition to a status. Errors that do not carry an
    /// `AcquireError` count as hardware unavailability.
    pub fn from_acquire_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<AcquireError>() {
            Some(AcquireError::PermissionDenied) => CameraStatus::PermissionDenied,
            Some(AcquireError::Unavailable(reason)) => CameraStatus::Unavailable(reason.clone()),
            None => CameraStatus::Unavailable(format!("{:#}", err)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CameraStatus::PermissionDenied | CameraStatus::Unavailable(_)
        )
    }

    /// The retry action offered on error screens.
    pub fn retry(&self) -> Option<CameraStatus> {
        self.is_error().then_some(CameraStatus::Starting)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiState {
    pub effect: EffectSettings,
    pub facing: CameraFacing,
    pub camera: CameraStatus,
    /// Bumped on every change.
    pub revision: u64,
}

impl UiState {
    pub fn new(effect: EffectSettings, facing: CameraFacing) -> Self {
        Self {
            effect,
            facing,
            camera: CameraStatus::Starting,
            revision: 0,
        }
    }

    fn next(&self) -> Self {
        Self {
            revision: self.revision + 1,
            ..self.clone()
        }
    }

    pub fn with_effect_enabled(&self, enabled: bool) -> Self {
        let mut next = self.next();
        next.effect.enabled = enabled;
        next
    }

    pub fn with_effect_kind(&self, kind: EffectKind) -> Self {
        let mut next = self.next();
        next.effect.kind = kind;
        next
    }

    pub fn with_intensity(&self, intensity: Intensity) -> Self {
        let mut next = self.next();
        next.effect.intensity = intensity;
        next
    }

    pub fn with_facing(&self, facing: CameraFacing) -> Self {
        let mut next = self.next();
        next.facing = facing;
        next
    }

    pub fn with_camera(&self, camera: CameraStatus) -> Self {
        let mut next = self.next();
        next.camera = camera;
        next
    }
}

/// Atomically swapped holder for the current `UiState`.
#[derive(Debug, Default)]
pub struct StateCell {
    current: Mutex<Arc<UiState>>,
}

impl StateCell {
    pub fn new(state: UiState) -> Self {
        Self {
            current: Mutex::new(Arc::new(state)),
        }
    }

    pub fn load(&self) -> Arc<UiState> {
        Arc::clone(&self.lock())
    }

    /// Derive a new record from the current one and swap it in.
    pub fn update(&self, change: impl FnOnce(&UiState) -> UiState) -> Arc<UiState> {
        let mut current = self.lock();
        let next = Arc::new(change(&current));
        *current = Arc::clone(&next);
        next
    }

    fn lock(&self) -> MutexGuard<'_, Arc<UiState>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn updates_produce_new_records() {
        let cell = StateCell::new(UiState::default());
        let before = cell.load();
        let after = cell.update(|s| s.with_intensity(Intensity::MAX).with_effect_enabled(false));
        assert_eq!(before.revision, 0);
        assert_eq!(after.revision, 2);
        assert_eq!(before.effect.intensity, Intensity::default());
        assert_eq!(cell.load().effect.intensity, Intensity::MAX);
        assert!(!cell.load().effect.enabled);
    }

    #[test]
    fn permission_denial_offers_retry() {
        let err: anyhow::Error = AcquireError::PermissionDenied.into();
        let status = CameraStatus::from_acquire_error(&err);
        assert_eq!(status, CameraStatus::PermissionDenied);
        assert_eq!(status.retry(), Some(CameraStatus::Starting));
        assert_eq!(CameraStatus::Running.retry(), None);
    }

    #[test]
    fn unknown_acquire_errors_are_unavailable() {
        let status = CameraStatus::from_acquire_error(&anyhow!("usb reset"));
        assert_eq!(status, CameraStatus::Unavailable("usb reset".to_string()));
    }
}
