//! Delivery into a tokio event loop.

use super::{DispatchStats, Executor, ExecutorKind, PanicHandler, StatsSnapshot, Task};
use crate::config::Config;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Thin adapter over a runtime's thread-safe spawn.
///
/// The runtime already knows how to accept work from any thread, so there is
/// no queue here: `execute` spawns the task onto the captured [`Handle`] and
/// returns. With a current-thread runtime the task runs on the thread
/// driving the loop; with a multi-thread runtime, on one of its workers.
///
/// If the runtime has already shut down, or shuts down before reaching the
/// task, tokio drops the task without running it and it is counted as
/// dropped.
pub struct EventLoopExecutor {
    handle: Handle,
    shutdown: AtomicBool,
    panics: Arc<PanicHandler>,
    stats: Arc<DispatchStats>,
}

impl EventLoopExecutor {
    pub fn new(handle: Handle, config: &Config) -> Result<Self> {
        config.validate()?;

        debug!(flavor = ?handle.runtime_flavor(), "event-loop executor bound");

        Ok(Self {
            handle,
            shutdown: AtomicBool::new(false),
            panics: Arc::new(PanicHandler::new(config.panic_strategy)),
            stats: Arc::new(DispatchStats::new()),
        })
    }

    /// Bind to the runtime driving the calling thread.
    pub fn current(config: &Config) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| Error::NoEventLoop)?;
        Self::new(handle, config)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn panic_count(&self) -> usize {
        self.panics.panic_count()
    }
}

impl Executor for EventLoopExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            self.stats.record_rejected();
            trace!(task = %task.id(), label = task.label(), "rejected after shutdown");
            return Err(Error::shutdown("event-loop"));
        }

        let panics = self.panics.clone();
        let mut unit_stats = CountDropped::new(self.stats.clone());
        self.stats.record_enqueued();

        // The JoinHandle is dropped: the unit is detached and its outcome is
        // only visible through the stats and the panic handler.
        self.handle.spawn(async move {
            unit_stats.disarm();
            trace!(
                task = %task.id(),
                label = task.label(),
                waited_us = task.age().as_micros() as u64,
                "delivering"
            );
            let outcome = panics.execute(move || task.run());
            unit_stats.stats.record_delivered();
            if outcome.is_err() {
                unit_stats.stats.record_panicked();
            }
        });

        Ok(())
    }

    fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("event-loop executor shut down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::EventLoop
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

// Counts a spawned unit as dropped if the runtime discards it before it is
// first polled, which is what tokio does once the runtime has shut down.
struct CountDropped {
    stats: Arc<DispatchStats>,
    armed: bool,
}

impl CountDropped {
    fn new(stats: Arc<DispatchStats>) -> Self {
        Self { stats, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CountDropped {
    fn drop(&mut self) {
        if self.armed {
            self.stats.record_dropped(1);
            trace!("unit discarded by the runtime before it ran");
        }
    }
}

impl std::fmt::Debug for EventLoopExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopExecutor")
            .field("flavor", &self.handle.runtime_flavor())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
