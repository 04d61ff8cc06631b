use std::{future::Future, path::PathBuf, pin::Pin, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{Local, Utc};
use log::{error, info, warn};
use tokio::{
    sync::{broadcast, Mutex},
    time,
};
use uuid::Uuid;

use crate::{
    alarm::Alarm,
    camera::{analysis::analyze_file, timestamped_name, Camera, CameraError},
    models::{
        capture::focus_from_progress, CaptureSettings, FailedFlush, IntervalConfig, LuxSample,
        TimerConfig,
    },
    settings::SettingsStore,
    storage::LuxStore,
};

use super::{
    countdown::Countdown,
    events::{SchedulerEvent, SchedulerSnapshot},
    interval::{CaptureCycle, IntervalCapture, MIN_PERIOD},
    state::{CameraStatus, CountdownReadout, RecordingState, SchedulerState},
};

const ALARM_DURATION: Duration = Duration::from_secs(3);
const EVENT_CAPACITY: usize = 256;
const PERMISSION_NOTICE: &str = "Permissions not granted by the user.";

type CaptureFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Everything the scheduler needs to know up front.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub capture: CaptureSettings,
    pub timer: TimerConfig,
    pub interval: IntervalConfig,
    pub pointer_visible: bool,
    /// Photos and videos are written here.
    pub media_dir: PathBuf,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SettingsStore, media_dir: PathBuf) -> Self {
        Self {
            capture: settings.capture_settings(),
            timer: settings.timer_config(),
            interval: settings.interval_config(),
            pointer_visible: settings.pointer_visible(),
            media_dir,
        }
    }
}

/// Result of a successful lux log flush.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedLog {
    pub session_id: Uuid,
    pub path: PathBuf,
    pub samples: usize,
}

#[derive(Clone)]
pub struct CaptureScheduler {
    state: Arc<Mutex<SchedulerState>>,
    countdown: Countdown,
    interval: IntervalCapture,
    readout: CountdownReadout,
    camera: Arc<dyn Camera>,
    store: Arc<dyn LuxStore>,
    alarm: Arc<dyn Alarm>,
    events: broadcast::Sender<SchedulerEvent>,
    capture: CaptureSettings,
    media_dir: Arc<PathBuf>,
}

impl CaptureScheduler {
    pub fn new(
        config: SchedulerConfig,
        camera: Arc<dyn Camera>,
        store: Arc<dyn LuxStore>,
        alarm: Arc<dyn Alarm>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut state = SchedulerState::new(
            config.timer,
            config.interval,
            config.capture.focus_distance,
        );
        state.pointer_visible = config.pointer_visible;

        Self {
            state: Arc::new(Mutex::new(state)),
            countdown: Countdown::new(),
            interval: IntervalCapture::new(),
            readout: CountdownReadout::new(config.timer.duration.as_millis() as u64),
            camera,
            store,
            alarm,
            events,
            capture: config.capture,
            media_dir: Arc::new(config.media_dir),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    pub async fn snapshot(&self) -> SchedulerSnapshot {
        let countdown_active = self.countdown.is_active().await;
        let state = self.state.lock().await;
        SchedulerSnapshot {
            timer_enabled: state.timer.enabled,
            interval_enabled: state.interval.enabled,
            lux_recording: state.lux.is_recording,
            lux_samples: state.lux.sample_count(),
            latest_lux: state.latest_lux,
            countdown_active,
            countdown_secs: self.readout.display_secs(),
            camera: state.camera.clone(),
            recording: state.recording.status(),
            focus_distance: state.focus_distance,
            pointer_visible: state.pointer_visible,
            unflushed_sessions: state.failed_flushes.len(),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.start_camera().await
    }

    /// Halts every schedule, ends an active lux session or recording and
    /// releases the camera.
    pub async fn stop(&self) -> Result<()> {
        self.cancel_timed_action().await;
        self.cancel_interval_capture().await?;

        let (lux_recording, video_recording) = {
            let state = self.state.lock().await;
            (
                state.lux.is_recording,
                matches!(state.recording, RecordingState::Recording { .. }),
            )
        };
        if lux_recording {
            if let Err(err) = self.stop_lux_session().await {
                error!("Lux session did not flush on stop: {err:#}");
            }
        }
        if video_recording {
            if let Err(err) = self.stop_video().await {
                error!("Recording did not stop cleanly: {err:#}");
            }
        }

        self.pause_camera().await;
        Ok(())
    }

    pub async fn dispose(self) -> Result<()> {
        self.stop().await?;
        let unflushed = self.state.lock().await.failed_flushes.len();
        if unflushed > 0 {
            warn!("Disposing scheduler with {unflushed} unflushed lux session(s)");
        }
        Ok(())
    }

    /// Applies to the next session; a running countdown is left alone.
    pub async fn toggle_timer_mode(&self) -> bool {
        let enabled = {
            let mut state = self.state.lock().await;
            state.timer.enabled = !state.timer.enabled;
            state.timer.enabled
        };
        info!("toggle timer: {}", if enabled { "on" } else { "off" });
        self.emit(SchedulerEvent::TimerModeChanged { enabled });
        enabled
    }

    pub async fn set_timer_mode(&self, enabled: bool) {
        self.state.lock().await.timer.enabled = enabled;
        self.emit(SchedulerEvent::TimerModeChanged { enabled });
    }

    pub async fn toggle_interval_mode(&self) -> bool {
        let enabled = {
            let mut state = self.state.lock().await;
            state.interval.enabled = !state.interval.enabled;
            state.interval.enabled
        };
        self.emit(SchedulerEvent::IntervalModeChanged { enabled });
        enabled
    }

    pub async fn set_interval_mode(&self, enabled: bool) {
        self.state.lock().await.interval.enabled = enabled;
        self.emit(SchedulerEvent::IntervalModeChanged { enabled });
    }

    /// Starts a countdown, superseding any running one.
    pub async fn start_timed_action<T, F, Fut>(&self, duration: Duration, on_tick: T, on_finish: F)
    where
        T: FnMut(Duration) + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.countdown.start(duration, on_tick, on_finish).await;
    }

    pub async fn cancel_timed_action(&self) -> bool {
        self.countdown.cancel().await
    }

    /// Countdown over the configured timer duration that drives the readout.
    async fn start_readout_countdown<F, Fut>(&self, on_finish: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let duration = self.state.lock().await.timer.duration;
        self.readout.set_ms(duration.as_millis() as u64);

        let readout = self.readout.clone();
        let events = self.events.clone();
        self.start_timed_action(
            duration,
            move |remaining| {
                let remaining_ms = remaining.as_millis() as u64;
                readout.set_ms(remaining_ms);
                let _ = events.send(SchedulerEvent::CountdownTick {
                    remaining_ms,
                    remaining_secs: remaining_ms / 1000,
                });
            },
            on_finish,
        )
        .await;
    }

    async fn reset_readout(&self) {
        let timer = self.state.lock().await.timer;
        self.readout.set_ms(timer.duration.as_millis() as u64);
        self.emit(SchedulerEvent::CountdownReset {
            display_secs: timer.display_secs(),
        });
    }

    /// Repeats camera on, `capture` one second later, camera off two seconds
    /// after the fire. First fire at `period - 1s`.
    pub async fn start_interval_capture<F, Fut>(&self, period: Duration, capture: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let capture: CaptureFn =
            Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(capture()) });
        let cycle = Arc::new(CameraCycle {
            scheduler: self.clone(),
            capture,
        });
        self.interval.start(period, cycle).await
    }

    pub async fn cancel_interval_capture(&self) -> Result<bool> {
        self.interval.cancel().await
    }

    pub async fn start_lux_session(&self) -> Result<Uuid> {
        let (session_id, timer, interval) = {
            let mut state = self.state.lock().await;
            if state.lux.is_recording {
                bail!("lux session already recording");
            }
            if state.interval.enabled && state.interval.period < MIN_PERIOD {
                bail!(
                    "interval of {}ms is too short; at least {}ms is needed",
                    state.interval.period.as_millis(),
                    MIN_PERIOD.as_millis()
                );
            }
            let session_id = Uuid::new_v4();
            state.lux.begin(session_id, Utc::now());
            (session_id, state.timer, state.interval)
        };
        info!(
            "Lux session {session_id} started (timer={}, interval={})",
            timer.enabled, interval.enabled
        );

        if timer.enabled {
            let scheduler = self.clone();
            self.start_readout_countdown(move || async move {
                scheduler.finish_timed_lux_session().await;
            })
            .await;
        }

        if interval.enabled {
            self.pause_camera().await;
            let scheduler = self.clone();
            let started = self
                .start_interval_capture(interval.period, move || {
                    let scheduler = scheduler.clone();
                    async move {
                        if let Err(err) = scheduler.take_photo().await {
                            warn!("Interval photo failed: {err:#}");
                        }
                    }
                })
                .await;
            if let Err(err) = started {
                error!("Interval capture did not start: {err:#}");
                if let Err(stop_err) = self.stop_lux_session().await {
                    error!("Lux session cleanup failed: {stop_err:#}");
                }
                return Err(err);
            }
        }

        self.emit(SchedulerEvent::LuxSessionStarted {
            session_id,
            timed: timer.enabled,
            interval: interval.enabled,
        });
        Ok(session_id)
    }

    /// Countdown finish of a timed session. The alarm only sounds when the
    /// session was still recording.
    async fn finish_timed_lux_session(&self) {
        match self.end_lux_session().await {
            Some(Ok(_)) => self.sound_alarm(),
            Some(Err(err)) => {
                error!("Timed lux session did not finish cleanly: {err:#}");
                self.sound_alarm();
            }
            None => info!("Timed lux session was already stopped"),
        }
    }

    fn sound_alarm(&self) {
        self.alarm.play();
        self.emit(SchedulerEvent::AlarmStarted);

        let alarm = self.alarm.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            time::sleep(ALARM_DURATION).await;
            alarm.stop();
            let _ = events.send(SchedulerEvent::AlarmStopped);
        });
    }

    /// Ends the session, stops the countdown and interval schedule, resets the
    /// readout and writes the log. On a failed write the samples are kept for
    /// [`retry_failed_flushes`](Self::retry_failed_flushes).
    pub async fn stop_lux_session(&self) -> Result<SavedLog> {
        match self.end_lux_session().await {
            Some(result) => result,
            None => bail!("no lux session is recording"),
        }
    }

    /// `None` when no session was recording.
    async fn end_lux_session(&self) -> Option<Result<SavedLog>> {
        let finished = self.state.lock().await.lux.finish()?;

        self.cancel_timed_action().await;
        if let Err(err) = self.cancel_interval_capture().await {
            warn!("Interval capture did not stop cleanly: {err:#}");
        }
        self.reset_readout().await;

        let stopped_at = Local::now();
        info!(
            "Lux session {} stopped after {}s with {} samples",
            finished.id,
            (stopped_at.with_timezone(&Utc) - finished.started_at).num_seconds(),
            finished.samples.len()
        );
        let path = self.store.target_for(stopped_at);
        Some(
            self.flush_session(finished.id, path, finished.samples, false)
                .await,
        )
    }

    pub async fn toggle_lux_session(&self) -> Result<bool> {
        let recording = self.state.lock().await.lux.is_recording;
        if recording {
            self.stop_lux_session().await?;
            Ok(false)
        } else {
            self.start_lux_session().await?;
            Ok(true)
        }
    }

    async fn flush_session(
        &self,
        session_id: Uuid,
        path: PathBuf,
        samples: Vec<LuxSample>,
        rewrite: bool,
    ) -> Result<SavedLog> {
        let outcome = if rewrite {
            self.store.rewrite(&path, &samples).await
        } else {
            self.store.flush(&path, &samples).await
        };
        match outcome {
            Ok(written) => {
                info!("Save Lux Data, {} ({written} samples)", path.display());
                self.emit(SchedulerEvent::LuxLogSaved {
                    session_id,
                    path: path.clone(),
                    samples: written,
                });
                Ok(SavedLog {
                    session_id,
                    path,
                    samples: written,
                })
            }
            Err(err) => {
                error!("Failed to save lux data to {}: {err:#}", path.display());
                self.emit(SchedulerEvent::LuxLogFailed {
                    session_id,
                    path: path.clone(),
                    error: format!("{err:#}"),
                });
                self.state.lock().await.failed_flushes.push(FailedFlush {
                    session_id,
                    path,
                    samples,
                    last_error: format!("{err:#}"),
                });
                Err(err.context("failed to save lux data"))
            }
        }
    }

    /// Rewrites every session whose log failed earlier, replacing any partial
    /// file. Sessions that fail again stay queued.
    pub async fn retry_failed_flushes(&self) -> Vec<SavedLog> {
        let pending = std::mem::take(&mut self.state.lock().await.failed_flushes);
        let mut saved = Vec::with_capacity(pending.len());
        for failed in pending {
            if let Ok(log) = self
                .flush_session(failed.session_id, failed.path, failed.samples, true)
                .await
            {
                saved.push(log);
            }
        }
        saved
    }

    /// Sink for the ambient light sensor. Always updates the live reading;
    /// keeps the sample only while a session is recording.
    pub async fn on_light_sample(&self, timestamp_ns: u64, lux: i32) -> bool {
        let kept = {
            let mut state = self.state.lock().await;
            state.latest_lux = Some(lux);
            state.lux.record(LuxSample::new(timestamp_ns, lux))
        };
        self.emit(SchedulerEvent::LuxReading { lux });
        kept
    }

    /// Binds the camera with the manual capture settings.
    pub async fn start_camera(&self) -> Result<()> {
        let outcome = self.camera.bind(&self.capture).await;

        let result = match outcome {
            Ok(info) => {
                let restore = {
                    let mut state = self.state.lock().await;
                    state.camera = CameraStatus::Bound {
                        min_focus_distance: info.min_focus_distance,
                    };
                    (state.focus_distance > 0.0)
                        .then(|| state.focus_distance.min(info.min_focus_distance))
                };
                if let Some(focus) = restore {
                    match self.camera.set_focus_distance(focus).await {
                        Ok(()) => self.state.lock().await.focus_distance = focus,
                        Err(err) => warn!("Failed to restore focus distance: {err}"),
                    }
                }
                Ok(())
            }
            Err(CameraError::PermissionDenied) => {
                let first_denial = {
                    let mut state = self.state.lock().await;
                    state.camera = CameraStatus::Disabled {
                        reason: CameraError::PermissionDenied.to_string(),
                    };
                    !std::mem::replace(&mut state.permission_notice_shown, true)
                };
                if first_denial {
                    self.emit(SchedulerEvent::Notice {
                        message: PERMISSION_NOTICE.to_string(),
                    });
                }
                Err(anyhow!(CameraError::PermissionDenied))
            }
            Err(err) => {
                error!("Use case binding failed: {err}");
                self.state.lock().await.camera = CameraStatus::Disabled {
                    reason: err.to_string(),
                };
                Err(anyhow!(err))
            }
        };

        let status = self.state.lock().await.camera.clone();
        self.emit(SchedulerEvent::CameraStateChanged { status });
        result
    }

    pub async fn pause_camera(&self) {
        self.camera.unbind().await;
        let status = {
            let mut state = self.state.lock().await;
            state.camera = CameraStatus::Unbound;
            state.camera.clone()
        };
        self.emit(SchedulerEvent::CameraStateChanged { status });
    }

    /// Moves the lens along its range; `progress` is a 0..=100 slider value.
    pub async fn set_focus_progress(&self, progress: u8) -> Result<f32> {
        let min_focus_distance = match &self.state.lock().await.camera {
            CameraStatus::Bound { min_focus_distance } => *min_focus_distance,
            _ => return Err(anyhow!(CameraError::NotBound)),
        };
        let focus = focus_from_progress(progress, min_focus_distance);
        self.camera
            .set_focus_distance(focus)
            .await
            .context("failed to apply focus distance")?;
        self.state.lock().await.focus_distance = focus;
        Ok(focus)
    }

    /// The capture button: immediate with the timer off, otherwise when the
    /// countdown finishes.
    pub async fn press_capture(&self) -> Result<()> {
        let timer = self.state.lock().await.timer;
        if !timer.enabled {
            return self.take_photo().await.map(|_| ());
        }

        let scheduler = self.clone();
        self.start_readout_countdown(move || async move {
            if let Err(err) = scheduler.take_photo().await {
                warn!("Timed photo failed: {err:#}");
            }
            scheduler.reset_readout().await;
        })
        .await;
        Ok(())
    }

    pub async fn take_photo(&self) -> Result<PathBuf> {
        if !self.state.lock().await.camera.is_bound() {
            return Err(anyhow!(CameraError::NotBound));
        }

        let path = self.media_dir.join(timestamped_name(Local::now(), "jpg"));
        if let Err(err) = self.camera.capture_photo(&path).await {
            error!("Photo capture failed: {err}");
            return Err(anyhow!(err));
        }
        info!("Photo capture succeeded: {}", path.display());

        let analysed = path.clone();
        let luminosity = match tokio::task::spawn_blocking(move || analyze_file(&analysed)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!("Luminosity analysis skipped: {err:#}");
                None
            }
            Err(err) => {
                warn!("Luminosity worker join failed: {err}");
                None
            }
        };

        self.emit(SchedulerEvent::PhotoSaved {
            path: path.clone(),
            luminosity,
        });
        Ok(path)
    }

    /// With the timer on, the recording stops itself when the countdown ends.
    /// The recording slot is reserved before the camera call so a second
    /// start is rejected while the first is in flight.
    pub async fn start_video(&self) -> Result<PathBuf> {
        {
            let mut state = self.state.lock().await;
            if !state.camera.is_bound() {
                return Err(anyhow!(CameraError::NotBound));
            }
            if !matches!(state.recording, RecordingState::Idle) {
                bail!("video recording already in progress");
            }
            state.recording = RecordingState::Starting;
        }

        let path = self.media_dir.join(timestamped_name(Local::now(), "mp4"));
        let started = self.camera.start_recording(&path).await;

        let timer = {
            let mut state = self.state.lock().await;
            match started {
                Ok(handle) => {
                    state.recording = RecordingState::Recording { handle };
                    state.timer
                }
                Err(err) => {
                    state.recording = RecordingState::Idle;
                    error!("Video recording failed to start: {err}");
                    return Err(anyhow!(err));
                }
            }
        };
        self.emit(SchedulerEvent::RecordingStarted { path: path.clone() });

        if timer.enabled {
            let scheduler = self.clone();
            self.start_readout_countdown(move || async move {
                if let Err(err) = scheduler.stop_video().await {
                    warn!("Timed recording stop failed: {err:#}");
                }
            })
            .await;
        }
        Ok(path)
    }

    /// Finalizes the recording: cancels the countdown and resets the readout.
    pub async fn stop_video(&self) -> Result<PathBuf> {
        let handle = {
            let mut state = self.state.lock().await;
            match std::mem::take(&mut state.recording) {
                RecordingState::Recording { handle } => handle,
                RecordingState::Starting => {
                    state.recording = RecordingState::Starting;
                    bail!("video recording is still starting");
                }
                RecordingState::Idle => bail!("no video recording in progress"),
            }
        };

        let path = handle.path.clone();
        let length = Utc::now() - handle.started_at;
        let stopped = self.camera.stop_recording(handle).await;

        self.cancel_timed_action().await;
        self.reset_readout().await;
        self.emit(SchedulerEvent::RecordingFinalized { path: path.clone() });

        if let Err(err) = stopped {
            error!("Video recording did not finalize: {err}");
            return Err(anyhow!(err));
        }
        info!(
            "Video saved after {}s: {}",
            length.num_seconds(),
            path.display()
        );
        Ok(path)
    }
}

/// Interval cycle bound to the scheduler's camera switch.
struct CameraCycle {
    scheduler: CaptureScheduler,
    capture: CaptureFn,
}

#[async_trait]
impl CaptureCycle for CameraCycle {
    async fn activate(&self) {
        self.scheduler.emit(SchedulerEvent::CaptureActive);
        if let Err(err) = self.scheduler.start_camera().await {
            warn!("Interval cycle could not switch the camera on: {err:#}");
        }
    }

    async fn capture(&self) {
        (self.capture)().await;
    }

    async fn deactivate(&self) {
        self.scheduler.pause_camera().await;
        self.scheduler.emit(SchedulerEvent::CaptureInactive);
    }
}
