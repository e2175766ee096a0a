//! Owner handle for spawned periodic work.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Interval;

/// Shortest period a background loop will tick at.
pub const MIN_TICK: Duration = Duration::from_secs(1);

/// Ticker for a periodic task. A zero period is raised to `MIN_TICK`
/// instead of panicking inside the spawned task.
pub fn ticker(name: &str, every: Duration) -> Interval {
    let period = if every.is_zero() {
        tracing::warn!("{} interval is zero, using {} ms", name, MIN_TICK.as_millis());
        MIN_TICK
    } else {
        every
    };
    tokio::time::interval(period)
}

/// Aborts the wrapped task on `stop()` or when dropped.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Stopped {} task", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
