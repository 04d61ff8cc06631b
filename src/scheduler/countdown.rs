use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant},
};

const TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Slot {
    /// Bumped on every start and cancel; a task whose generation no longer
    /// matches is dead and must not call back.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// The single countdown. Starting a new one supersedes whatever was running.
#[derive(Clone, Default)]
pub struct Countdown {
    slot: Arc<Mutex<Slot>>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `on_tick(remaining)` after every elapsed whole second while time
    /// remains, then `on_finish` once when `duration` has elapsed.
    ///
    /// The slot is cleared before `on_finish` runs, so it may start or cancel
    /// countdowns itself.
    pub async fn start<T, F, Fut>(&self, duration: Duration, mut on_tick: T, on_finish: F)
    where
        T: FnMut(Duration) + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        let shared = self.slot.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let deadline = started + duration;
            let mut elapsed: u32 = 1;

            loop {
                let next_tick = started + TICK * elapsed;
                if next_tick >= deadline {
                    time::sleep_until(deadline).await;
                    {
                        let mut guard = shared.lock().await;
                        if guard.generation != generation {
                            return;
                        }
                        guard.handle = None;
                    }
                    on_finish().await;
                    return;
                }

                time::sleep_until(next_tick).await;
                {
                    let guard = shared.lock().await;
                    if guard.generation != generation {
                        return;
                    }
                    on_tick(deadline - next_tick);
                }
                elapsed = elapsed.saturating_add(1);
            }
        });

        slot.handle = Some(handle);
    }

    /// Returns whether a countdown was running. Safe to call at any time.
    pub async fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().await;
        slot.generation = slot.generation.wrapping_add(1);
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.handle.is_some()
    }
}
