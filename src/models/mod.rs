pub mod capture;
pub mod lux;

pub use capture::{CaptureSettings, IntervalConfig, TimerConfig};
pub use lux::{FailedFlush, FinishedSession, LuxSample, LuxSession};
