//! Inline delivery on the engine's thread, one task at a time.

use super::{DispatchStats, Executor, ExecutorKind, StatsSnapshot, Task};
use crate::error::{Error, Result};
use parking_lot::ReentrantMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, trace};

/// Runs each task synchronously on the calling thread while holding a
/// single lock.
///
/// No two tasks submitted from different threads ever overlap, which gives
/// callers a single-threaded view of their callbacks without a separate
/// scheduling context. The price is that the engine thread that fired the
/// callback is blocked until the task returns.
///
/// This executor blocks; it never queues. A task that calls back into
/// `execute` on the same thread runs inline rather than deadlocking.
///
/// A panicking task is not caught: the panic unwinds into the thread that
/// called `execute`. The lock is released during unwinding and later tasks
/// are unaffected.
#[derive(Debug, Default)]
pub struct SerializingExecutor {
    gate: ReentrantMutex<()>,
    shutdown: AtomicBool,
    stats: DispatchStats,
}

impl SerializingExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for SerializingExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            self.stats.record_rejected();
            trace!(task = %task.id(), label = task.label(), "rejected after shutdown");
            return Err(Error::shutdown("serializing"));
        }

        self.stats.record_enqueued();

        let _gate = self.gate.lock();
        let _delivery = Delivery::begin(&self.stats);
        trace!(task = %task.id(), label = task.label(), "delivering inline");
        task.run();

        Ok(())
    }

    fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("serializing executor shut down");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Serializing
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

// Counts the task as delivered when the run ends, and as panicked too when
// it ends by unwinding. Runs before the gate is released.
struct Delivery<'a> {
    stats: &'a DispatchStats,
    already_panicking: bool,
}

impl<'a> Delivery<'a> {
    fn begin(stats: &'a DispatchStats) -> Self {
        Self {
            stats,
            already_panicking: thread::panicking(),
        }
    }
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        self.stats.record_delivered();
        if thread::panicking() && !self.already_panicking {
            self.stats.record_panicked();
        }
    }
}
