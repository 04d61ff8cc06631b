use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One ambient light reading.
///
/// `timestamp_ns` is wall-clock time in nanoseconds since the Unix epoch. This
/// is the unit written to the lux log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LuxSample {
    pub timestamp_ns: u64,
    pub lux: i32,
}

impl LuxSample {
    pub fn new(timestamp_ns: u64, lux: i32) -> Self {
        Self { timestamp_ns, lux }
    }

    /// Stamps a raw sensor value with the current wall-clock time. Fractional
    /// lux is truncated toward zero.
    pub fn now(lux: f32) -> Self {
        Self::new(wall_clock_ns(Utc::now()), lux as i32)
    }
}

pub fn wall_clock_ns(at: DateTime<Utc>) -> u64 {
    at.timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LuxSession {
    pub id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub is_recording: bool,
    /// Arrival order; duplicate timestamps are kept.
    #[serde(skip)]
    pub samples: Vec<LuxSample>,
}

/// Samples taken out of a session that just stopped, waiting to be written.
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub samples: Vec<LuxSample>,
}

impl LuxSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, id: Uuid, started_at: DateTime<Utc>) {
        *self = Self {
            id: Some(id),
            started_at: Some(started_at),
            is_recording: true,
            samples: Vec::new(),
        };
    }

    /// Appends the sample only while recording. Returns whether it was kept.
    pub fn record(&mut self, sample: LuxSample) -> bool {
        if !self.is_recording {
            return false;
        }
        self.samples.push(sample);
        true
    }

    /// Ends the session and hands its samples over for flushing.
    pub fn finish(&mut self) -> Option<FinishedSession> {
        if !self.is_recording {
            return None;
        }
        let finished = FinishedSession {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            samples: std::mem::take(&mut self.samples),
        };
        *self = Self::default();
        Some(finished)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// A session whose log could not be written. The samples stay in memory
/// until a retry succeeds.
#[derive(Debug, Clone)]
pub struct FailedFlush {
    pub session_id: Uuid,
    pub path: PathBuf,
    pub samples: Vec<LuxSample>,
    pub last_error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_ignored_while_idle() {
        let mut session = LuxSession::new();
        assert!(!session.record(LuxSample::new(1, 10)));
        assert_eq!(session.sample_count(), 0);
        assert!(session.finish().is_none());
    }

    #[test]
    fn finish_hands_over_samples_in_arrival_order() {
        let mut session = LuxSession::new();
        let id = Uuid::new_v4();
        session.begin(id, Utc::now());
        session.record(LuxSample::new(30, 1));
        session.record(LuxSample::new(10, 2));
        session.record(LuxSample::new(10, 3));

        let finished = session.finish().expect("session was recording");
        assert_eq!(finished.id, id);
        assert_eq!(
            finished.samples,
            vec![LuxSample::new(30, 1), LuxSample::new(10, 2), LuxSample::new(10, 3)]
        );
        assert!(!session.is_recording);
        assert_eq!(session.sample_count(), 0);
    }

    #[test]
    fn sample_now_truncates_fractional_lux() {
        assert_eq!(LuxSample::now(12.9).lux, 12);
        assert_eq!(LuxSample::now(-0.5).lux, 0);
    }
}
