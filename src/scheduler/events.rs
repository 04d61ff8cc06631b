use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use super::state::{CameraStatus, RecordingStatus};

/// Everything the user-facing layer renders, pushed as it happens.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchedulerEvent {
    TimerModeChanged {
        enabled: bool,
    },
    IntervalModeChanged {
        enabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    CountdownTick {
        remaining_ms: u64,
        remaining_secs: u64,
    },
    /// Readout back at the configured duration.
    #[serde(rename_all = "camelCase")]
    CountdownReset {
        display_secs: u64,
    },
    LuxReading {
        lux: i32,
    },
    #[serde(rename_all = "camelCase")]
    LuxSessionStarted {
        session_id: Uuid,
        timed: bool,
        interval: bool,
    },
    #[serde(rename_all = "camelCase")]
    LuxLogSaved {
        session_id: Uuid,
        path: PathBuf,
        samples: usize,
    },
    #[serde(rename_all = "camelCase")]
    LuxLogFailed {
        session_id: Uuid,
        path: PathBuf,
        error: String,
    },
    /// Interval cycle switched the camera on.
    CaptureActive,
    CaptureInactive,
    PhotoSaved {
        path: PathBuf,
        luminosity: Option<f64>,
    },
    RecordingStarted {
        path: PathBuf,
    },
    RecordingFinalized {
        path: PathBuf,
    },
    CameraStateChanged {
        status: CameraStatus,
    },
    Notice {
        message: String,
    },
    AlarmStarted,
    AlarmStopped,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub timer_enabled: bool,
    pub interval_enabled: bool,
    pub lux_recording: bool,
    pub lux_samples: usize,
    pub latest_lux: Option<i32>,
    pub countdown_active: bool,
    pub countdown_secs: u64,
    pub camera: CameraStatus,
    pub recording: RecordingStatus,
    pub focus_distance: f32,
    pub pointer_visible: bool,
    pub unflushed_sessions: usize,
}
