use anyhow::{anyhow, Context, Result};
use log::warn;
use serde_json::{Map, Value};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::models::capture::{
    CaptureSettings, IntervalConfig, TimerConfig, DEFAULT_EXPOSURE_TIME_NS,
    DEFAULT_FRAME_DURATION_NS, DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_WIDTH, DEFAULT_INTERVAL_MS,
    DEFAULT_SENSITIVITY, DEFAULT_TIMER_MS,
};

pub const IMAGE_WIDTH: &str = "image_width";
pub const IMAGE_HEIGHT: &str = "image_height";
pub const EXPOSURE_TIME: &str = "exposure_time";
pub const FRAME_DURATION: &str = "frame_duration";
pub const SENSITIVITY: &str = "sensitivity";
pub const FOCUS_DISTANCE: &str = "focus_distance";
pub const TIMER_TIME: &str = "timer_time";
/// Seconds between interval photos.
pub const INTERVAL_TIME: &str = "interval_time";
pub const POINTER: &str = "pointer";

/// String-keyed settings persisted as a flat JSON object.
///
/// Values may be stored as strings (the way a preference screen writes
/// them), numbers or booleans. Anything that does not parse falls back to
/// the documented default.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings {}: {err}", path.display());
                Map::new()
            })
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        guard.insert(key.to_string(), value.into());
        self.persist(&guard)
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn positive_u64(&self, key: &str, default: u64) -> u64 {
        match self.get(key).map(|value| parse_u64(&value)) {
            None => default,
            Some(Some(value)) if value > 0 => value,
            Some(_) => {
                warn!("Setting {key} is not a positive integer; using {default}");
                default
            }
        }
    }

    fn positive_u32(&self, key: &str, default: u32) -> u32 {
        let value = self.positive_u64(key, default as u64);
        u32::try_from(value).unwrap_or_else(|_| {
            warn!("Setting {key} is out of range; using {default}");
            default
        })
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        let focus_distance = match self.get(FOCUS_DISTANCE).map(|value| parse_f32(&value)) {
            Some(Some(value)) if value >= 0.0 => value,
            Some(_) => {
                warn!("Setting {FOCUS_DISTANCE} is not a non-negative number; using 0");
                0.0
            }
            None => 0.0,
        };

        CaptureSettings {
            width: self.positive_u32(IMAGE_WIDTH, DEFAULT_IMAGE_WIDTH),
            height: self.positive_u32(IMAGE_HEIGHT, DEFAULT_IMAGE_HEIGHT),
            exposure_time_ns: self.positive_u64(EXPOSURE_TIME, DEFAULT_EXPOSURE_TIME_NS),
            frame_duration_ns: self.positive_u64(FRAME_DURATION, DEFAULT_FRAME_DURATION_NS),
            sensitivity: self.positive_u32(SENSITIVITY, DEFAULT_SENSITIVITY),
            focus_distance,
        }
    }

    /// Timer duration in milliseconds. The enabled flag is a runtime toggle
    /// and starts off.
    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            enabled: false,
            duration: Duration::from_millis(self.positive_u64(TIMER_TIME, DEFAULT_TIMER_MS)),
        }
    }

    /// The stored value is in seconds; a missing key means the default period.
    pub fn interval_config(&self) -> IntervalConfig {
        let period_ms = match self.get(INTERVAL_TIME).map(|value| parse_u64(&value)) {
            Some(Some(secs)) if secs > 0 => secs.saturating_mul(1000),
            Some(_) => {
                warn!("Setting {INTERVAL_TIME} is not a positive integer; using {DEFAULT_INTERVAL_MS}ms");
                DEFAULT_INTERVAL_MS
            }
            None => DEFAULT_INTERVAL_MS,
        };

        IntervalConfig {
            enabled: false,
            period: Duration::from_millis(period_ms),
        }
    }

    pub fn pointer_visible(&self) -> bool {
        match self.get(POINTER) {
            Some(Value::Bool(flag)) => flag,
            Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
}

fn parse_f32(value: &Value) -> Option<f32> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_f64().map(|n| n as f32),
        _ => None,
    }
}
