use std::sync::Arc;

use tracing::warn;

use crate::{timer::ExposureTimer, ExposureConfig, ExposureError};

/// Place a secret can be shown in and wiped from, such as the clipboard.
pub trait SecretSink: Send + Sync + 'static {
    fn expose(&self, secret: &str) -> Result<(), ExposureError>;

    /// Remove the secret. Called once per exposure window; may be called when
    /// the sink is already clear.
    fn purge(&self) -> Result<(), ExposureError>;
}

/// Exposes secrets to a sink and purges them when the timer runs out.
pub struct SecretExposer<S: SecretSink> {
    sink: Arc<S>,
    timer: ExposureTimer,
}

impl<S: SecretSink> SecretExposer<S> {
    pub fn new(sink: Arc<S>, config: ExposureConfig) -> Self {
        let purge_sink = Arc::clone(&sink);
        let timer = ExposureTimer::new(
            config,
            Arc::new(move || {
                if let Err(err) = purge_sink.purge() {
                    warn!(%err, "failed to purge exposed secret");
                }
            }),
        );
        Self { sink, timer }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn timer(&self) -> &ExposureTimer {
        &self.timer
    }

    /// Hand `secret` to the sink and (re)arm the countdown.
    ///
    /// The sink write and the re-arm happen under the timer lock, so a purge
    /// due from the previous window never wipes the new secret.
    pub fn expose<F>(&self, secret: &str, on_tick: F) -> Result<(), ExposureError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.timer.start_with(|| self.sink.expose(secret), on_tick)
    }

    /// Wait for the current exposure window to close.
    pub async fn wait(&self) {
        self.timer.wait_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use tokio::time;

    use super::*;
    use crate::TimerState;

    #[derive(Default)]
    struct MemorySink {
        current: Mutex<Option<String>>,
        purges: Mutex<usize>,
        refuse: bool,
        /// Time the sink keeps working after storing a secret.
        settle: Duration,
    }

    impl MemorySink {
        fn current(&self) -> Option<String> {
            self.current.lock().expect("current").clone()
        }

        fn purges(&self) -> usize {
            *self.purges.lock().expect("purges")
        }
    }

    impl SecretSink for MemorySink {
        fn expose(&self, secret: &str) -> Result<(), ExposureError> {
            if self.refuse {
                return Err(ExposureError::Sink {
                    reason: "sink unavailable".into(),
                });
            }
            *self.current.lock().expect("current") = Some(secret.to_string());
            std::thread::sleep(self.settle);
            Ok(())
        }

        fn purge(&self) -> Result<(), ExposureError> {
            *self.current.lock().expect("current") = None;
            *self.purges.lock().expect("purges") += 1;
            Ok(())
        }
    }

    fn short_window() -> ExposureConfig {
        ExposureConfig {
            clear_after_secs: 3,
            tick_millis: 1000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn secret_is_purged_after_the_window() {
        let exposer = SecretExposer::new(Arc::new(MemorySink::default()), short_window());

        exposer.expose("hunter2\n", |_| {}).expect("expose");
        assert_eq!(exposer.sink().current().as_deref(), Some("hunter2\n"));

        exposer.wait().await;
        assert_eq!(exposer.sink().current(), None);
        assert_eq!(exposer.sink().purges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn re_exposing_extends_the_window() {
        let exposer = SecretExposer::new(Arc::new(MemorySink::default()), short_window());

        exposer.expose("first\n", |_| {}).expect("expose");
        time::sleep(Duration::from_millis(2500)).await;
        exposer.expose("second\n", |_| {}).expect("expose");
        time::sleep(Duration::from_millis(1800)).await;

        assert_eq!(exposer.sink().current().as_deref(), Some("second\n"));
        assert_eq!(exposer.timer().state(), TimerState::Running);

        exposer.wait().await;
        assert_eq!(exposer.sink().purges(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn due_purge_does_not_wipe_a_slow_re_exposure() {
        let sink = MemorySink {
            settle: Duration::from_millis(300),
            ..MemorySink::default()
        };
        let exposer = SecretExposer::new(
            Arc::new(sink),
            ExposureConfig {
                clear_after_secs: 1,
                tick_millis: 1000,
            },
        );

        exposer.expose("first\n", |_| {}).expect("expose");
        // The first window's only tick falls due while the second write settles.
        time::sleep(Duration::from_millis(800)).await;
        exposer.expose("second\n", |_| {}).expect("expose");

        assert_eq!(exposer.sink().current().as_deref(), Some("second\n"));
        assert_eq!(exposer.timer().state(), TimerState::Running);
        assert_eq!(exposer.sink().purges(), 0);

        exposer.wait().await;
        assert_eq!(exposer.sink().current(), None);
        assert_eq!(exposer.sink().purges(), 1);
    }

    #[tokio::test]
    async fn sink_failure_does_not_arm_the_timer() {
        let sink = MemorySink {
            refuse: true,
            ..MemorySink::default()
        };
        let exposer = SecretExposer::new(Arc::new(sink), short_window());

        let err = exposer.expose("pw\n", |_| {}).expect_err("refused");
        assert!(matches!(err, ExposureError::Sink { .. }));
        assert_eq!(exposer.timer().state(), TimerState::Idle);
    }
}
