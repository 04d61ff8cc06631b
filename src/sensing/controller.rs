use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scheduler::CaptureScheduler;

use super::{loop_worker::sensing_loop, LightSensor};

/// Owns the task that pumps sensor readings into the scheduler.
#[derive(Default)]
pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_sensing(
        &mut self,
        sensor: Box<dyn LightSensor>,
        scheduler: CaptureScheduler,
    ) -> Result<()> {
        if self.handle.as_ref().is_some_and(|handle| !handle.is_finished()) {
            bail!("sensing already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(sensor, scheduler, cancel_token.clone()));
        info!("Light sensing started");

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// True once the loop has exited on its own or been stopped.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sensing loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
