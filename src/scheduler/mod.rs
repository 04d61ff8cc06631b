pub mod controller;
pub mod countdown;
pub mod events;
pub mod interval;
pub mod state;

pub use controller::{CaptureScheduler, SavedLog, SchedulerConfig};
pub use events::{SchedulerEvent, SchedulerSnapshot};
pub use state::{CameraStatus, RecordingStatus};
