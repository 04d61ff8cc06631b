use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Delay between switching the camera on and taking the photo, and again
/// between the photo and switching it off.
pub const CYCLE_STEP: Duration = Duration::from_secs(1);

/// A period shorter than one full on-capture-off cycle would overlap cycles.
pub const MIN_PERIOD: Duration = Duration::from_secs(2);

/// The three steps of one interval fire.
#[async_trait]
pub trait CaptureCycle: Send + Sync + 'static {
    async fn activate(&self);
    async fn capture(&self);
    async fn deactivate(&self);
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// The single repeating interval-photo schedule.
#[derive(Clone, Default)]
pub struct IntervalCapture {
    slot: Arc<Mutex<Option<Running>>>,
}

impl IntervalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// First fire at `period - 1s`, then every `period`. Replaces any schedule
    /// already running.
    pub async fn start(&self, period: Duration, cycle: Arc<dyn CaptureCycle>) -> Result<()> {
        if period < MIN_PERIOD {
            bail!(
                "interval period {}ms is shorter than the {}ms capture cycle",
                period.as_millis(),
                MIN_PERIOD.as_millis()
            );
        }

        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            stop_running(previous).await?;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(interval_loop(period, cycle, token.clone()));
        *slot = Some(Running { token, handle });
        log_info!("interval capture started every {}ms", period.as_millis());
        Ok(())
    }

    /// Returns whether a schedule was running. Cycles already past their
    /// capture step still switch the camera off.
    pub async fn cancel(&self) -> Result<bool> {
        let running = self.slot.lock().await.take();
        match running {
            Some(running) => {
                stop_running(running).await?;
                log_info!("interval capture cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

async fn stop_running(running: Running) -> Result<()> {
    running.token.cancel();
    running
        .handle
        .await
        .context("interval loop task failed to join")
}

async fn interval_loop(period: Duration, cycle: Arc<dyn CaptureCycle>, token: CancellationToken) {
    let first_fire = Instant::now() + period.saturating_sub(CYCLE_STEP);
    let mut ticker = time::interval_at(first_fire, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            fired_at = ticker.tick() => {
                log_debug!("interval fire");
                tokio::spawn(run_cycle(fired_at, cycle.clone(), token.clone()));
            }
        }
    }
}

/// on at `fired_at`, capture at +1s, off at +2s. Each cycle runs as its own
/// task so a slow capture never delays the next fire.
async fn run_cycle(fired_at: Instant, cycle: Arc<dyn CaptureCycle>, token: CancellationToken) {
    if token.is_cancelled() {
        return;
    }
    cycle.activate().await;

    let capture_due = tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = time::sleep_until(fired_at + CYCLE_STEP) => true,
    };

    if capture_due {
        // Not raced against cancellation: an in-flight capture completes.
        cycle.capture().await;
        tokio::select! {
            biased;
            _ = token.cancelled() => {},
            _ = time::sleep_until(fired_at + CYCLE_STEP * 2) => {},
        }
    }

    cycle.deactivate().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Active,
        CaptureStart,
        CaptureDone,
        Inactive,
    }

    struct Recorder {
        origin: Instant,
        capture_takes: Duration,
        steps: StdMutex<Vec<(u64, Step)>>,
    }

    impl Recorder {
        fn new(capture_takes: Duration) -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                capture_takes,
                steps: StdMutex::new(Vec::new()),
            })
        }

        fn push(&self, step: Step) {
            let at = self.origin.elapsed().as_millis() as u64;
            self.steps.lock().unwrap().push((at, step));
        }

        fn steps(&self) -> Vec<(u64, Step)> {
            self.steps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaptureCycle for Recorder {
        async fn activate(&self) {
            self.push(Step::Active);
        }

        async fn capture(&self) {
            self.push(Step::CaptureStart);
            if !self.capture_takes.is_zero() {
                time::sleep(self.capture_takes).await;
            }
            self.push(Step::CaptureDone);
        }

        async fn deactivate(&self) {
            self.push(Step::Inactive);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_offset_by_one_second_then_every_period() {
        let recorder = Recorder::new(Duration::ZERO);
        let interval = IntervalCapture::new();
        interval
            .start(Duration::from_millis(5000), recorder.clone())
            .await
            .unwrap();

        time::sleep(Duration::from_millis(14_500)).await;

        use Step::*;
        assert_eq!(
            recorder.steps(),
            vec![
                (4000, Active),
                (5000, CaptureStart),
                (5000, CaptureDone),
                (6000, Inactive),
                (9000, Active),
                (10_000, CaptureStart),
                (10_000, CaptureDone),
                (11_000, Inactive),
                (14_000, Active),
            ]
        );
        assert!(interval.cancel().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_capture_skips_it_and_releases_camera() {
        let recorder = Recorder::new(Duration::ZERO);
        let interval = IntervalCapture::new();
        interval
            .start(Duration::from_millis(5000), recorder.clone())
            .await
            .unwrap();

        time::sleep(Duration::from_millis(4500)).await;
        assert!(interval.cancel().await.unwrap());
        time::sleep(Duration::from_millis(20_000)).await;

        assert_eq!(
            recorder.steps(),
            vec![(4000, Step::Active), (4500, Step::Inactive)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_capture_completes_after_cancel() {
        let recorder = Recorder::new(Duration::from_millis(1500));
        let interval = IntervalCapture::new();
        interval
            .start(Duration::from_millis(5000), recorder.clone())
            .await
            .unwrap();

        time::sleep(Duration::from_millis(5500)).await;
        interval.cancel().await.unwrap();
        time::sleep(Duration::from_millis(20_000)).await;

        use Step::*;
        assert_eq!(
            recorder.steps(),
            vec![
                (4000, Active),
                (5000, CaptureStart),
                (6500, CaptureDone),
                (6500, Inactive),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_schedule() {
        let first = Recorder::new(Duration::ZERO);
        let second = Recorder::new(Duration::ZERO);
        let interval = IntervalCapture::new();
        interval
            .start(Duration::from_millis(3000), first.clone())
            .await
            .unwrap();
        interval
            .start(Duration::from_millis(3000), second.clone())
            .await
            .unwrap();

        time::sleep(Duration::from_millis(2500)).await;
        assert!(first.steps().is_empty());
        assert_eq!(second.steps(), vec![(2000, Step::Active)]);
        interval.cancel().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_periods_shorter_than_a_cycle() {
        let interval = IntervalCapture::new();
        let recorder = Recorder::new(Duration::ZERO);
        assert!(interval
            .start(Duration::from_millis(1999), recorder)
            .await
            .is_err());
        assert!(!interval.is_active().await);
        assert!(!interval.cancel().await.unwrap());
    }
}
