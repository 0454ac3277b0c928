//! Delivery into a single-threaded cooperative scheduler.

use super::{DispatchStats, Executor, ExecutorKind, PanicHandler, StatsSnapshot, Task};
use crate::channel::HandoffChannel;
use crate::config::Config;
use crate::error::{Error, Result};
use futures::future::{abortable, AbortHandle};
use futures::task::{LocalSpawn, LocalSpawnExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Executor that moves tasks from foreign threads into a cooperative
/// scheduler such as [`futures::executor::LocalPool`].
///
/// Construction spawns one pump future onto the scheduler. The pump takes
/// tasks off a [`HandoffChannel`] in FIFO order and spawns each one as its
/// own unit of work without waiting for it, so deliveries interleave with
/// the rest of the scheduler's work. A panicking callback ends only its own
/// unit.
///
/// The pump must be stopped explicitly with [`shutdown`](Executor::shutdown)
/// (dropping the executor does the same). If the scheduler goes away first,
/// the pump is dropped with it and the executor starts rejecting tasks.
pub struct CooperativeExecutor {
    channel: Arc<HandoffChannel<Task>>,
    pump: AbortHandle,
    shutdown: AtomicBool,
    over_threshold: AtomicBool,
    queue_warn_threshold: Option<usize>,
    name: String,
    panics: Arc<PanicHandler>,
    stats: Arc<DispatchStats>,
}

impl CooperativeExecutor {
    pub fn new<S>(spawner: &S, config: &Config) -> Result<Self>
    where
        S: LocalSpawn + Clone + 'static,
    {
        config.validate()?;

        let channel = Arc::new(HandoffChannel::new());
        let panics = Arc::new(PanicHandler::new(config.panic_strategy));
        let stats = Arc::new(DispatchStats::new());

        let (pump, handle) = abortable(pump(
            channel.clone(),
            spawner.clone(),
            panics.clone(),
            stats.clone(),
            config.pump_name.clone(),
        ));
        spawner.spawn_local(async move {
            let _ = pump.await;
        })?;

        debug!(pump = %config.pump_name, "cooperative executor started");

        Ok(Self {
            channel,
            pump: handle,
            shutdown: AtomicBool::new(false),
            over_threshold: AtomicBool::new(false),
            queue_warn_threshold: config.queue_warn_threshold,
            name: config.pump_name.clone(),
            panics,
            stats,
        })
    }

    /// Tasks waiting for the pump.
    pub fn pending(&self) -> usize {
        self.channel.len()
    }

    pub fn panic_count(&self) -> usize {
        self.panics.panic_count()
    }

    fn reject(&self, task: Task) -> Error {
        self.stats.record_rejected();
        trace!(
            pump = %self.name,
            task = %task.id(),
            label = task.label(),
            "rejected after shutdown"
        );
        Error::shutdown(self.name.clone())
    }

    fn check_depth(&self) {
        let Some(limit) = self.queue_warn_threshold else {
            return;
        };

        let depth = self.channel.len();
        if depth >= limit {
            if !self.over_threshold.swap(true, Ordering::Relaxed) {
                warn!(
                    pump = %self.name,
                    depth,
                    limit,
                    "handoff queue is growing faster than the scheduler drains it"
                );
            }
        } else if depth < limit / 2 {
            self.over_threshold.store(false, Ordering::Relaxed);
        }
    }
}

impl Executor for CooperativeExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(self.reject(task));
        }

        match self.channel.put(task) {
            Ok(()) => {
                self.stats.record_enqueued();
                self.check_depth();
                Ok(())
            }
            // The pump closed the channel on its way out, so nothing will
            // ever drain it.
            Err(closed) if !self.is_shutdown() => {
                self.stats.record_rejected();
                debug!(pump = %self.name, "pump is gone, rejecting task");
                Err(closed.into())
            }
            Err(closed) => Err(self.reject(closed.into_inner())),
        }
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        self.pump.abort();
        let dropped = self.channel.close();
        self.stats.record_dropped(dropped as u64);

        debug!(pump = %self.name, dropped, "cooperative executor shut down");
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Cooperative
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for CooperativeExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CooperativeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooperativeExecutor")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// Closes the channel when the pump goes away for any reason, so producers
// stop queueing into a channel nobody drains.
struct CloseOnDrop {
    channel: Arc<HandoffChannel<Task>>,
    stats: Arc<DispatchStats>,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let dropped = self.channel.close();
        self.stats.record_dropped(dropped as u64);
    }
}

async fn pump<S>(
    channel: Arc<HandoffChannel<Task>>,
    spawner: S,
    panics: Arc<PanicHandler>,
    stats: Arc<DispatchStats>,
    name: String,
) where
    S: LocalSpawn,
{
    let _guard = CloseOnDrop {
        channel: channel.clone(),
        stats: stats.clone(),
    };

    while let Some(task) = channel.recv().await {
        let panics = panics.clone();
        let unit_stats = stats.clone();

        let unit = async move {
            trace!(
                task = %task.id(),
                label = task.label(),
                waited_us = task.age().as_micros() as u64,
                "delivering"
            );
            let outcome = panics.execute(move || task.run());
            unit_stats.record_delivered();
            if outcome.is_err() {
                unit_stats.record_panicked();
            }
        };

        if let Err(err) = spawner.spawn_local(unit) {
            warn!(pump = %name, %err, "scheduler refused a delivery, stopping pump");
            stats.record_dropped(1);
            break;
        }
    }

    debug!(pump = %name, "pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::LocalPool;
    use parking_lot::Mutex;
    use std::thread;

    fn config() -> Config {
        Config::builder()
            .panic_strategy(crate::executor::PanicStrategy::Isolate)
            .build()
            .unwrap()
    }

    #[test]
    fn test_delivers_foreign_tasks_in_fifo_order() {
        let mut pool = LocalPool::new();
        let executor = Arc::new(CooperativeExecutor::new(&pool.spawner(), &config()).unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        let producer = {
            let executor = executor.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let seen = seen.clone();
                    executor
                        .execute(Task::new("push", move || seen.lock().push(i)))
                        .unwrap();
                }
                executor
                    .execute(Task::new("done", move || {
                        let _ = done_tx.send(());
                    }))
                    .unwrap();
            })
        };

        pool.run_until(done_rx).unwrap();
        producer.join().unwrap();

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
        assert_eq!(executor.stats().delivered, 101);
    }

    #[test]
    fn test_panic_does_not_stop_pump() {
        let mut pool = LocalPool::new();
        let executor = CooperativeExecutor::new(&pool.spawner(), &config()).unwrap();
        let hits = Arc::new(Mutex::new(0));

        executor
            .execute(Task::new("boom", || panic!("callback failed")))
            .unwrap();
        let h = hits.clone();
        executor
            .execute(Task::new("after", move || *h.lock() += 1))
            .unwrap();
        pool.run_until_stalled();

        let h = hits.clone();
        executor
            .execute(Task::new("later", move || *h.lock() += 1))
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(*hits.lock(), 2);
        assert_eq!(executor.panic_count(), 1);
        assert_eq!(executor.stats().panicked, 1);
    }

    #[test]
    fn test_shutdown_rejects_and_is_idempotent() {
        let pool = LocalPool::new();
        let executor = CooperativeExecutor::new(&pool.spawner(), &config()).unwrap();

        executor.shutdown();
        executor.shutdown();

        let result = executor.execute(Task::new("late", || {}));
        assert!(matches!(result, Err(Error::ExecutorShutdown(_))));
        assert!(executor.is_shutdown());
        assert_eq!(executor.stats().rejected, 1);
    }

    #[test]
    fn test_shutdown_drops_undelivered_tasks() {
        let mut pool = LocalPool::new();
        let executor = CooperativeExecutor::new(&pool.spawner(), &config()).unwrap();
        let ran = Arc::new(Mutex::new(false));

        for _ in 0..3 {
            let ran = ran.clone();
            executor
                .execute(Task::new("pending", move || *ran.lock() = true))
                .unwrap();
        }
        assert_eq!(executor.pending(), 3);

        executor.shutdown();
        pool.run_until_stalled();

        assert!(!*ran.lock());
        assert_eq!(executor.stats().dropped, 3);
    }

    #[test]
    fn test_scheduler_teardown_rejects_later_tasks() {
        let mut pool = LocalPool::new();
        let executor = CooperativeExecutor::new(&pool.spawner(), &config()).unwrap();
        pool.run_until_stalled();

        drop(pool);

        let err = executor.execute(Task::new("orphan", || {})).unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        assert!(err.is_delivery_failure());
        assert!(!executor.is_shutdown());
        assert_eq!(executor.stats().rejected, 1);
    }

    #[test]
    fn test_queue_warning_fires_once_and_rearms_below_half() {
        let mut pool = LocalPool::new();
        let config = Config::builder().queue_warn_threshold(4).build().unwrap();
        let executor = CooperativeExecutor::new(&pool.spawner(), &config).unwrap();
        let over = |e: &CooperativeExecutor| e.over_threshold.load(Ordering::Relaxed);

        for _ in 0..3 {
            executor.execute(Task::new("fill", || {})).unwrap();
        }
        assert!(!over(&executor));

        executor.execute(Task::new("cross", || {})).unwrap();
        assert!(over(&executor));
        executor.execute(Task::new("stay", || {})).unwrap();
        assert!(over(&executor));

        pool.run_until_stalled();
        assert_eq!(executor.pending(), 0);

        // depth 1 is below half the limit
        executor.execute(Task::new("rearm", || {})).unwrap();
        assert!(!over(&executor));

        for _ in 0..3 {
            executor.execute(Task::new("refill", || {})).unwrap();
        }
        assert!(over(&executor));
    }

    #[test]
    fn test_queue_warning_disabled() {
        let pool = LocalPool::new();
        let config = Config::builder().no_queue_warning().build().unwrap();
        let executor = CooperativeExecutor::new(&pool.spawner(), &config).unwrap();

        for _ in 0..50 {
            executor.execute(Task::new("fill", || {})).unwrap();
        }
        assert!(!executor.over_threshold.load(Ordering::Relaxed));
    }
}
