use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_IMAGE_WIDTH: u32 = 1080;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 1920;
pub const DEFAULT_EXPOSURE_TIME_NS: u64 = 20_400_000;
pub const DEFAULT_FRAME_DURATION_NS: u64 = 16_666_666;
pub const DEFAULT_SENSITIVITY: u32 = 100;
pub const DEFAULT_TIMER_MS: u64 = 5000;
pub const DEFAULT_INTERVAL_MS: u64 = 5000;

/// Manual sensor parameters applied when the camera is bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub exposure_time_ns: u64,
    pub frame_duration_ns: u64,
    /// ISO value.
    pub sensitivity: u32,
    /// Diopters; 0.0 is infinity.
    pub focus_distance: f32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
            exposure_time_ns: DEFAULT_EXPOSURE_TIME_NS,
            frame_duration_ns: DEFAULT_FRAME_DURATION_NS,
            sensitivity: DEFAULT_SENSITIVITY,
            focus_distance: 0.0,
        }
    }
}

/// Maps a focus slider position (0..=100) onto the lens range, where
/// `min_focus_distance` is the closest focus the lens supports in diopters.
pub fn focus_from_progress(progress: u8, min_focus_distance: f32) -> f32 {
    let progress = progress.min(100) as f32;
    progress * min_focus_distance / 100.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub enabled: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: Duration::from_millis(DEFAULT_TIMER_MS),
        }
    }
}

impl TimerConfig {
    /// Whole seconds shown on the countdown readout when idle.
    pub fn display_secs(&self) -> u64 {
        self.duration.as_secs()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntervalConfig {
    pub enabled: bool,
    #[serde(with = "duration_ms")]
    pub period: Duration,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period: Duration::from_millis(DEFAULT_INTERVAL_MS),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_progress_scales_linearly() {
        assert_eq!(focus_from_progress(0, 10.0), 0.0);
        assert_eq!(focus_from_progress(50, 10.0), 5.0);
        assert_eq!(focus_from_progress(100, 10.0), 10.0);
        // Slider positions past the end clamp to the lens minimum.
        assert_eq!(focus_from_progress(150, 10.0), 10.0);
    }

    #[test]
    fn timer_config_serializes_duration_as_millis() {
        let json = serde_json::to_value(TimerConfig::default()).unwrap();
        assert_eq!(json["duration"], 5000);
        assert_eq!(json["enabled"], false);
        assert_eq!(TimerConfig::default().display_secs(), 5);
    }
}
