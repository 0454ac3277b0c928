//! Executors decide which scheduling context a callback ultimately runs in.
//!
//! The engine fires callbacks on its own threads. Instead of running user
//! code there, the router hands each fired callback to an [`Executor`] as a
//! [`Task`], and the executor delivers it:
//!
//! - [`CooperativeExecutor`] into a single-threaded cooperative scheduler,
//!   through a [`HandoffChannel`](crate::channel::HandoffChannel) drained by
//!   a pump future;
//! - [`EventLoopExecutor`] into a tokio runtime through its handle;
//! - [`SerializingExecutor`] inline on the engine's thread, one task at a
//!   time.

pub mod cooperative;
#[cfg(feature = "tokio")]
pub mod event_loop;
pub mod panic_handler;
pub mod serializing;
pub mod stats;
pub mod task;

pub use cooperative::CooperativeExecutor;
#[cfg(feature = "tokio")]
pub use event_loop::EventLoopExecutor;
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use serializing::SerializingExecutor;
pub use stats::{DispatchStats, StatsSnapshot};
pub use task::{Task, TaskId};

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// An executor shared by every stream of a session.
pub type SharedExecutor = Arc<dyn Executor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    Cooperative,
    EventLoop,
    Serializing,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorKind::Cooperative => "cooperative",
            ExecutorKind::EventLoop => "event-loop",
            ExecutorKind::Serializing => "serializing",
        };
        f.write_str(name)
    }
}

/// Capability to run a [`Task`] in a particular context.
///
/// `execute` may be called from any thread. A task handed to `execute` runs
/// at most once. Once [`shutdown`](Executor::shutdown) has been called every
/// further `execute` is rejected with
/// [`Error::ExecutorShutdown`](crate::Error::ExecutorShutdown) and the task
/// is dropped without running.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> Result<()>;

    /// Stop accepting tasks and release the delivery mechanism. Idempotent.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;

    fn kind(&self) -> ExecutorKind;

    fn stats(&self) -> StatsSnapshot;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }

    fn is_shutdown(&self) -> bool {
        (**self).is_shutdown()
    }

    fn kind(&self) -> ExecutorKind {
        (**self).kind()
    }

    fn stats(&self) -> StatsSnapshot {
        (**self).stats()
    }
}

/// Convenience for submitting plain closures.
pub trait ExecutorExt: Executor {
    fn execute_fn<F>(&self, label: &'static str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Task::new(label, f))
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}
