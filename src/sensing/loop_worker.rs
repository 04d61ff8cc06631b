use tokio_util::sync::CancellationToken;

use crate::{models::LuxSample, scheduler::CaptureScheduler};

use super::LightSensor;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Forwards every reading to the scheduler, stamped with wall-clock time,
/// until the sensor runs dry or the token is cancelled.
pub async fn sensing_loop(
    mut sensor: Box<dyn LightSensor>,
    scheduler: CaptureScheduler,
    cancel_token: CancellationToken,
) {
    let mut readings: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("sensing loop shutting down after {readings} readings");
                break;
            }
            reading = sensor.next_reading() => {
                let Some(lux) = reading else {
                    log_info!("light sensor stream ended after {readings} readings");
                    break;
                };
                let sample = LuxSample::now(lux);
                let kept = scheduler.on_light_sample(sample.timestamp_ns, sample.lux).await;
                readings += 1;
                log_debug!("lux={} kept={kept}", sample.lux);
            }
        }
    }
}
