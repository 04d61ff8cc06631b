//! Camera collaborator seam.
//!
//! The scheduler never talks to a camera pipeline directly. It asks a
//! [`Camera`] to bind with manual [`CaptureSettings`], take photos, record
//! video and release the device, and reacts to the returned outcome.

pub mod analysis;
pub mod headless;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::CaptureSettings;

pub use headless::HeadlessCamera;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CameraError {
    #[error("camera permission was not granted")]
    PermissionDenied,
    #[error("camera is not bound")]
    NotBound,
    #[error("failed to bind camera: {0}")]
    BindFailed(String),
    #[error("photo capture failed: {0}")]
    CaptureFailed(String),
}

/// What the device reported once bound.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Closest focus the lens supports, in diopters.
    pub min_focus_distance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingHandle {
    pub id: u64,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Releases any previous binding, then binds with the given manual
    /// settings (auto exposure, focus and white balance off).
    async fn bind(&self, settings: &CaptureSettings) -> Result<CameraInfo, CameraError>;

    async fn unbind(&self);

    async fn capture_photo(&self, path: &Path) -> Result<(), CameraError>;

    async fn start_recording(&self, path: &Path) -> Result<RecordingHandle, CameraError>;

    async fn stop_recording(&self, handle: RecordingHandle) -> Result<(), CameraError>;

    async fn set_focus_distance(&self, diopters: f32) -> Result<(), CameraError>;
}

/// `yyyy-MM-dd-HH-mm-ss-SSS` in local time.
pub fn timestamped_name(at: DateTime<chrono::Local>, extension: &str) -> String {
    format!("{}.{extension}", at.format("%Y-%m-%d-%H-%M-%S-%3f"))
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    };

    #[derive(Debug, Clone, PartialEq)]
    pub enum CameraCall {
        Bind,
        Unbind,
        Photo(PathBuf),
        StartRecording(PathBuf),
        StopRecording(u64),
        Focus(f32),
    }

    /// Records every call with the paused-clock instant it happened at.
    #[derive(Default)]
    pub struct FakeCamera {
        pub calls: Mutex<Vec<(tokio::time::Instant, CameraCall)>>,
        pub deny_permission: AtomicBool,
        /// Latency of `start_recording` and `set_focus_distance`.
        pub io_delay: std::time::Duration,
        next_recording: AtomicU64,
    }

    impl FakeCamera {
        pub fn denying() -> Self {
            let camera = Self::default();
            camera.deny_permission.store(true, Ordering::SeqCst);
            camera
        }

        pub fn slow(io_delay: std::time::Duration) -> Self {
            Self {
                io_delay,
                ..Self::default()
            }
        }

        async fn stall(&self) {
            if !self.io_delay.is_zero() {
                tokio::time::sleep(self.io_delay).await;
            }
        }

        fn push(&self, call: CameraCall) {
            self.calls
                .lock()
                .unwrap()
                .push((tokio::time::Instant::now(), call));
        }

        pub fn calls(&self) -> Vec<CameraCall> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, call)| call.clone())
                .collect()
        }

        pub fn photo_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, CameraCall::Photo(_)))
                .count()
        }
    }

    #[async_trait]
    impl Camera for FakeCamera {
        async fn bind(&self, _settings: &CaptureSettings) -> Result<CameraInfo, CameraError> {
            if self.deny_permission.load(Ordering::SeqCst) {
                return Err(CameraError::PermissionDenied);
            }
            self.push(CameraCall::Bind);
            Ok(CameraInfo {
                min_focus_distance: 10.0,
            })
        }

        async fn unbind(&self) {
            self.push(CameraCall::Unbind);
        }

        async fn capture_photo(&self, path: &Path) -> Result<(), CameraError> {
            self.push(CameraCall::Photo(path.to_path_buf()));
            Ok(())
        }

        async fn start_recording(&self, path: &Path) -> Result<RecordingHandle, CameraError> {
            self.stall().await;
            self.push(CameraCall::StartRecording(path.to_path_buf()));
            Ok(RecordingHandle {
                id: self.next_recording.fetch_add(1, Ordering::SeqCst),
                path: path.to_path_buf(),
                started_at: Utc::now(),
            })
        }

        async fn stop_recording(&self, handle: RecordingHandle) -> Result<(), CameraError> {
            self.push(CameraCall::StopRecording(handle.id));
            Ok(())
        }

        async fn set_focus_distance(&self, diopters: f32) -> Result<(), CameraError> {
            self.stall().await;
            self.push(CameraCall::Focus(diopters));
            Ok(())
        }
    }
}
