use std::{
    convert::Infallible,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info};

use crate::ExposureConfig;

/// Callback that removes the exposed secret. Must be idempotent.
pub type PurgeFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
}

struct Countdown {
    state: TimerState,
    remaining: Duration,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    countdown: Mutex<Countdown>,
    purge: PurgeFn,
    state_tx: watch::Sender<TimerState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Countdown> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resettable countdown that runs a purge callback when it reaches zero.
///
/// Starting a running timer replaces the window with a full new one; the
/// purge fires once per exposure window, never early.
pub struct ExposureTimer {
    config: ExposureConfig,
    shared: Arc<Shared>,
}

impl ExposureTimer {
    pub fn new(config: ExposureConfig, purge: PurgeFn) -> Self {
        let (state_tx, _) = watch::channel(TimerState::Idle);
        Self {
            config,
            shared: Arc::new(Shared {
                countdown: Mutex::new(Countdown {
                    state: TimerState::Idle,
                    remaining: Duration::ZERO,
                    generation: 0,
                    task: None,
                }),
                purge,
                state_tx,
            }),
        }
    }

    /// Start or reset the countdown. `on_tick` receives the whole seconds left
    /// after every tick of the new window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, on_tick: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let _ = self.start_with(|| Ok::<(), Infallible>(()), on_tick);
    }

    /// Run `expose` and arm a fresh window while holding the countdown lock.
    ///
    /// A tick of the previous window that is already due cannot purge the new
    /// secret: it blocks on the lock and then finds its generation retired.
    /// When `expose` fails the timer is left untouched.
    pub fn start_with<E, X, F>(&self, expose: X, on_tick: F) -> Result<(), E>
    where
        X: FnOnce() -> Result<(), E>,
        F: Fn(u64) + Send + Sync + 'static,
    {
        let total = self.config.total();
        let mut countdown = self.shared.lock();
        expose()?;

        if let Some(task) = countdown.task.take() {
            task.abort();
        }
        let restarted = countdown.state == TimerState::Running;
        countdown.state = TimerState::Running;
        countdown.remaining = total;
        countdown.generation += 1;
        let generation = countdown.generation;
        let shared = Arc::clone(&self.shared);
        let tick = self.config.tick();
        countdown.task = Some(tokio::spawn(run(shared, generation, tick, on_tick)));
        self.shared.state_tx.send_if_modified(|state| {
            let changed = *state != TimerState::Running;
            *state = TimerState::Running;
            changed
        });
        if restarted {
            debug!(seconds = total.as_secs(), "exposure countdown reset");
        } else {
            info!(seconds = total.as_secs(), "exposure countdown started");
        }
        Ok(())
    }

    /// Stop the countdown without purging.
    pub fn cancel(&self) {
        let mut countdown = self.shared.lock();
        if countdown.state == TimerState::Idle {
            return;
        }
        countdown.state = TimerState::Idle;
        countdown.remaining = Duration::ZERO;
        if let Some(task) = countdown.task.take() {
            task.abort();
        }
        self.shared.state_tx.send_replace(TimerState::Idle);
        debug!("exposure countdown cancelled");
    }

    pub fn state(&self) -> TimerState {
        self.shared.lock().state
    }

    pub fn remaining(&self) -> Duration {
        self.shared.lock().remaining
    }

    pub fn watch_state(&self) -> watch::Receiver<TimerState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the timer is idle, either purged or cancelled.
    pub async fn wait_idle(&self) {
        let mut rx = self.watch_state();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| *state == TimerState::Idle).await;
    }
}

impl Drop for ExposureTimer {
    fn drop(&mut self) {
        if let Some(task) = self.shared.lock().task.take() {
            task.abort();
        }
    }
}

async fn run<F>(shared: Arc<Shared>, generation: u64, tick: Duration, on_tick: F)
where
    F: Fn(u64),
{
    let mut interval = time::interval_at(Instant::now() + tick, tick);
    loop {
        interval.tick().await;

        let remaining = {
            let mut countdown = shared.lock();
            if countdown.generation != generation || countdown.state != TimerState::Running {
                return;
            }
            countdown.remaining = countdown.remaining.saturating_sub(tick);
            countdown.remaining
        };

        on_tick(whole_seconds(remaining));

        if remaining.is_zero() {
            let mut countdown = shared.lock();
            // A start between the tick and here resets the window.
            if countdown.generation != generation
                || countdown.state != TimerState::Running
                || !countdown.remaining.is_zero()
            {
                continue;
            }
            (shared.purge)();
            countdown.state = TimerState::Idle;
            countdown.task = None;
            shared.state_tx.send_replace(TimerState::Idle);
            info!("exposure window closed");
            return;
        }
    }
}

fn whole_seconds(remaining: Duration) -> u64 {
    remaining.as_millis().div_ceil(1000) as u64
}
