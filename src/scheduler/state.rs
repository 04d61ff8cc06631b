use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    camera::RecordingHandle,
    models::{FailedFlush, IntervalConfig, LuxSession, TimerConfig},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CameraStatus {
    Unbound,
    #[serde(rename_all = "camelCase")]
    Bound { min_focus_distance: f32 },
    /// Capture stays off until the camera is started again.
    Disabled { reason: String },
}

impl CameraStatus {
    pub fn is_bound(&self) -> bool {
        matches!(self, CameraStatus::Bound { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// Reserved while the camera starts the recording.
    Starting,
    Recording {
        handle: RecordingHandle,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecordingStatus {
    Idle,
    Starting,
    Recording,
}

impl RecordingState {
    pub fn status(&self) -> RecordingStatus {
        match self {
            RecordingState::Idle => RecordingStatus::Idle,
            RecordingState::Starting => RecordingStatus::Starting,
            RecordingState::Recording { .. } => RecordingStatus::Recording,
        }
    }
}

/// Mutable scheduler state. Only touched under the scheduler's state lock.
#[derive(Debug)]
pub struct SchedulerState {
    pub timer: TimerConfig,
    pub interval: IntervalConfig,
    pub lux: LuxSession,
    pub latest_lux: Option<i32>,
    pub recording: RecordingState,
    pub camera: CameraStatus,
    pub focus_distance: f32,
    pub pointer_visible: bool,
    /// Sessions whose log could not be written, oldest first.
    pub failed_flushes: Vec<FailedFlush>,
    pub permission_notice_shown: bool,
}

impl SchedulerState {
    pub fn new(timer: TimerConfig, interval: IntervalConfig, focus_distance: f32) -> Self {
        Self {
            timer,
            interval,
            lux: LuxSession::new(),
            latest_lux: None,
            recording: RecordingState::Idle,
            camera: CameraStatus::Unbound,
            focus_distance,
            pointer_visible: false,
            failed_flushes: Vec::new(),
            permission_notice_shown: false,
        }
    }
}

/// The remaining-time indicator. Written from countdown ticks, which run
/// outside the state lock.
#[derive(Debug, Clone, Default)]
pub struct CountdownReadout {
    remaining_ms: Arc<AtomicU64>,
}

impl CountdownReadout {
    pub fn new(initial_ms: u64) -> Self {
        Self {
            remaining_ms: Arc::new(AtomicU64::new(initial_ms)),
        }
    }

    pub fn set_ms(&self, remaining_ms: u64) {
        self.remaining_ms.store(remaining_ms, Ordering::SeqCst);
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms.load(Ordering::SeqCst)
    }

    /// Whole seconds, rounded down.
    pub fn display_secs(&self) -> u64 {
        self.remaining_ms() / 1000
    }
}
