use super::error::BufferError;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum TimerState {
    NotStarted,
    Running {
        cancel: CancellationToken,
        _task: JoinHandle<()>,
    },
    Stopped,
}

/// Decides when a send should happen: on a queue-size threshold, or on a
/// recurring timer.
///
/// The timer starts lazily and at most once. A second timer would double
/// every scheduled send, so `start` is a no-op while one is running, and a
/// stopped scheduler stays stopped.
pub struct BatchScheduler {
    batch_size: usize,
    interval: Duration,
    timer: Mutex<TimerState>,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, interval: Duration) -> Result<Self, BufferError> {
        if batch_size == 0 {
            return Err(BufferError::InvalidBatchSize { size: batch_size });
        }
        if interval.is_zero() {
            return Err(BufferError::InvalidInterval {
                interval_ms: interval.as_millis() as u64,
            });
        }

        Ok(Self {
            batch_size,
            interval,
            timer: Mutex::new(TimerState::NotStarted),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Size trigger: evaluated by the coordinator after every enqueue.
    pub fn size_trigger_reached(&self, queue_len: usize) -> bool {
        queue_len >= self.batch_size
    }

    /// Start the periodic timer on `runtime`, calling `on_tick` every
    /// interval. The first tick fires one full interval after start.
    ///
    /// Returns `true` only for the call that actually started the timer.
    pub fn start<F, Fut>(&self, runtime: &Handle, on_tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timer = self.timer.lock();
        if !matches!(*timer, TimerState::NotStarted) {
            return false;
        }

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let period = self.interval;

        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => on_tick().await,
                }
            }

            debug!("Batch timer stopped");
        });

        debug!(interval_ms = period.as_millis() as u64, "Batch timer started");
        *timer = TimerState::Running {
            cancel,
            _task: task,
        };
        true
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.timer.lock(), TimerState::Running { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(*self.timer.lock(), TimerState::Stopped)
    }

    /// Cancel the timer. Once stopped the scheduler cannot be restarted.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.timer.lock(), TimerState::Stopped);
        if let TimerState::Running { cancel, .. } = previous {
            cancel.cancel();
        }
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("batch_size", &self.batch_size)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
