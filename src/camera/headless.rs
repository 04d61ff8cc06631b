use async_trait::async_trait;
use chrono::Utc;
use image::{GrayImage, Luma};
use log::{info, warn};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Mutex,
    },
};

use super::{Camera, CameraError, CameraInfo, RecordingHandle};
use crate::models::CaptureSettings;

const MIN_FOCUS_DISTANCE: f32 = 10.0;

/// A camera without a sensor: photos are flat grey frames written as JPEG,
/// recordings are only logged. Used by the headless runner.
pub struct HeadlessCamera {
    bound: AtomicBool,
    level: AtomicU8,
    settings: Mutex<Option<CaptureSettings>>,
    next_recording: AtomicU64,
}

impl HeadlessCamera {
    pub fn new() -> Self {
        Self {
            bound: AtomicBool::new(false),
            level: AtomicU8::new(128),
            settings: Mutex::new(None),
            next_recording: AtomicU64::new(1),
        }
    }

    /// Grey level of subsequent frames.
    pub fn set_level(&self, level: u8) {
        self.level.store(level, Ordering::Relaxed);
    }

    fn bound_settings(&self) -> Result<CaptureSettings, CameraError> {
        if !self.bound.load(Ordering::SeqCst) {
            return Err(CameraError::NotBound);
        }
        self.settings
            .lock()
            .map_err(|_| CameraError::CaptureFailed("camera state poisoned".into()))?
            .ok_or(CameraError::NotBound)
    }
}

impl Default for HeadlessCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Camera for HeadlessCamera {
    async fn bind(&self, settings: &CaptureSettings) -> Result<CameraInfo, CameraError> {
        *self
            .settings
            .lock()
            .map_err(|_| CameraError::BindFailed("camera state poisoned".into()))? = Some(*settings);
        self.bound.store(true, Ordering::SeqCst);
        info!(
            "Headless camera bound {}x{} exposure={}ns frame={}ns iso={}",
            settings.width,
            settings.height,
            settings.exposure_time_ns,
            settings.frame_duration_ns,
            settings.sensitivity
        );
        Ok(CameraInfo {
            min_focus_distance: MIN_FOCUS_DISTANCE,
        })
    }

    async fn unbind(&self) {
        if self.bound.swap(false, Ordering::SeqCst) {
            info!("Headless camera unbound");
        }
    }

    async fn capture_photo(&self, path: &Path) -> Result<(), CameraError> {
        let settings = self.bound_settings()?;
        let level = self.level.load(Ordering::Relaxed);
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let frame = GrayImage::from_pixel(settings.width, settings.height, Luma([level]));
            frame.save(&path).map_err(|err| {
                CameraError::CaptureFailed(format!("failed to write {}: {err}", path.display()))
            })
        })
        .await
        .map_err(|err| CameraError::CaptureFailed(format!("capture worker join failed: {err}")))?
    }

    async fn start_recording(&self, path: &Path) -> Result<RecordingHandle, CameraError> {
        self.bound_settings()?;
        let handle = RecordingHandle {
            id: self.next_recording.fetch_add(1, Ordering::SeqCst),
            path: path.to_path_buf(),
            started_at: Utc::now(),
        };
        info!("Headless recording {} started at {}", handle.id, path.display());
        Ok(handle)
    }

    async fn stop_recording(&self, handle: RecordingHandle) -> Result<(), CameraError> {
        let elapsed = Utc::now() - handle.started_at;
        info!(
            "Headless recording {} stopped after {}ms ({})",
            handle.id,
            elapsed.num_milliseconds(),
            handle.path.display()
        );
        Ok(())
    }

    async fn set_focus_distance(&self, diopters: f32) -> Result<(), CameraError> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| CameraError::CaptureFailed("camera state poisoned".into()))?;
        match guard.as_mut() {
            Some(settings) if self.bound.load(Ordering::SeqCst) => {
                settings.focus_distance = diopters.clamp(0.0, MIN_FOCUS_DISTANCE);
                Ok(())
            }
            _ => {
                warn!("Ignoring focus change while the camera is unbound");
                Err(CameraError::NotBound)
            }
        }
    }
}
