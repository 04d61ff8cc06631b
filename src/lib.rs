pub mod alarm;
pub mod camera;
pub mod models;
pub mod scheduler;
pub mod sensing;
pub mod settings;
pub mod storage;
mod utils;

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use alarm::AlarmHandle;
use camera::HeadlessCamera;
use scheduler::{CaptureScheduler, SchedulerConfig, SchedulerEvent};
use sensing::{LineLightSensor, SensingController};
use settings::SettingsStore;
use storage::{resolve_output_dir, CsvLuxStore};

pub const APP_NAME: &str = "Camera-ALS";

const SENSOR_POLL: Duration = Duration::from_millis(250);
const ALARM_GRACE: Duration = Duration::from_secs(4);

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Initializes logging (reads RUST_LOG, defaults to info).
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

/// Headless runner: one lux session fed from stdin (one lux value per line),
/// with the timer and interval modes taken from `CAMERA_ALS_TIMER` and
/// `CAMERA_ALS_INTERVAL`. Events are printed to stdout as JSON lines.
pub fn run() -> Result<()> {
    init_logging();
    info!("{APP_NAME} starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run_headless())
}

async fn run_headless() -> Result<()> {
    let data_dir = std::env::var_os("CAMERA_ALS_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("camera-als"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let media_dirs: Vec<PathBuf> = std::env::var_os("CAMERA_ALS_MEDIA_DIR")
        .map(PathBuf::from)
        .into_iter()
        .collect();
    let output_dir = resolve_output_dir(&media_dirs, APP_NAME, &data_dir.join("files"));

    let scheduler = CaptureScheduler::new(
        SchedulerConfig::from_settings(&settings, output_dir.clone()),
        Arc::new(HeadlessCamera::new()),
        Arc::new(CsvLuxStore::new(output_dir)),
        Arc::new(AlarmHandle::new()),
    );
    let mut events = scheduler.subscribe();

    if let Err(err) = scheduler.start().await {
        warn!("Camera unavailable: {err:#}");
    }
    let timed = env_flag("CAMERA_ALS_TIMER");
    scheduler.set_timer_mode(timed).await;
    scheduler.set_interval_mode(env_flag("CAMERA_ALS_INTERVAL")).await;

    let mut sensing = SensingController::new();
    sensing.start_sensing(Box::new(LineLightSensor::stdin()), scheduler.clone())?;
    scheduler.start_lux_session().await?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {err}");
            std::future::pending::<()>().await;
        }
    };
    let ended = wait_for_session_end(&mut events, &sensing, shutdown).await;
    info!("Session loop ended: {ended:?}");
    let session_ended = ended == SessionEnd::Saved;

    sensing.stop_sensing().await?;
    if !session_ended {
        if let Err(err) = scheduler.stop_lux_session().await {
            warn!("Lux session did not save: {err:#}");
        }
    } else if timed {
        wait_for_alarm(&mut events).await;
    }

    let retried = scheduler.retry_failed_flushes().await;
    if !retried.is_empty() {
        info!("Saved {} previously failed lux log(s)", retried.len());
    }
    scheduler.dispose().await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The lux log was written (or failed to be) by the scheduler itself.
    Saved,
    SensorClosed,
    Interrupted,
    EventsClosed,
}

/// Prints events until the session log is written, the sensor stream ends or
/// `shutdown` resolves. `shutdown` is polled across iterations, so a signal
/// that arrives while events are being printed is not lost.
async fn wait_for_session_end(
    events: &mut broadcast::Receiver<SchedulerEvent>,
    sensing: &SensingController,
    shutdown: impl Future<Output = ()>,
) -> SessionEnd {
    tokio::pin!(shutdown);
    let mut sensor_poll = tokio::time::interval(SENSOR_POLL);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted");
                return SessionEnd::Interrupted;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    if matches!(
                        event,
                        SchedulerEvent::LuxLogSaved { .. } | SchedulerEvent::LuxLogFailed { .. }
                    ) {
                        return SessionEnd::Saved;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {skipped} events"),
                Err(RecvError::Closed) => return SessionEnd::EventsClosed,
            },
            _ = sensor_poll.tick() => {
                if sensing.is_finished() {
                    info!("Light sensor input closed");
                    return SessionEnd::SensorClosed;
                }
            }
        }
    }
}

async fn wait_for_alarm(events: &mut broadcast::Receiver<SchedulerEvent>) {
    let waited = tokio::time::timeout(ALARM_GRACE, async {
        loop {
            match events.recv().await {
                Ok(SchedulerEvent::AlarmStopped) | Err(RecvError::Closed) => break,
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => {}
            }
        }
    })
    .await;
    if waited.is_err() {
        warn!("Alarm did not stop within {}s", ALARM_GRACE.as_secs());
    }
}

fn print_event(event: &SchedulerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!("Failed to serialize event: {err}"),
    }
}
