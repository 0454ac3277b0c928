//! An engine handle and the executor its callbacks are delivered through.

use crate::engine::{Engine, StreamId};
use crate::error::{Error, Result};
use crate::executor::{Executor, SharedExecutor, Task};
use crate::router::{CallbackRouter, StreamCallbacks};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Owns one engine and the executor shared by all of its streams.
///
/// Sessions are created and torn down explicitly; there is no process-wide
/// engine. [`terminate`](Session::terminate) stops the engine first so no
/// more callbacks fire, then shuts the executor down, dropping anything it
/// had not delivered yet. Dropping the session terminates it.
pub struct Session<E: Engine> {
    engine: E,
    executor: SharedExecutor,
    next_stream: AtomicU64,
    terminated: AtomicBool,
}

impl<E: Engine> Session<E> {
    pub fn new(engine: E, executor: SharedExecutor) -> Self {
        debug!(executor = %executor.kind(), "session created");
        Self {
            engine,
            executor,
            next_stream: AtomicU64::new(1),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn executor(&self) -> &SharedExecutor {
        &self.executor
    }

    /// Start the engine. `on_running` is delivered through the session's
    /// executor once the engine reports it is ready.
    pub fn start<F>(&self, on_running: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_live()?;

        let executor = self.executor.clone();
        self.engine.run(Box::new(move || {
            if let Err(err) = executor.execute(Task::new("on_engine_running", on_running)) {
                debug!(%err, "engine-running notification dropped");
            }
        }))
    }

    /// Open a stream whose callbacks are routed through this session's
    /// executor.
    pub fn open_stream(&self, callbacks: StreamCallbacks) -> Result<E::Stream> {
        self.ensure_live()?;

        let id = StreamId(self.next_stream.fetch_add(1, Ordering::Relaxed));
        let mut stream = self.engine.new_stream(id)?;
        CallbackRouter::new(id, self.executor.clone(), callbacks).install(&mut stream);

        debug!(stream = %id, executor = %self.executor.kind(), "stream opened");
        Ok(stream)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Stop the engine, then the executor. Idempotent.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        self.engine.terminate();
        self.executor.shutdown();

        let stats = self.executor.stats();
        debug!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            panicked = stats.panicked,
            "session terminated"
        );
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::SessionTerminated);
        }
        Ok(())
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl<E: Engine> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("executor", &self.executor.kind())
            .field("streams_opened", &(self.next_stream.load(Ordering::Relaxed) - 1))
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
