//! Task representation and execution.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A callback plus the arguments it was fired with, moved by value from the
/// producing thread to whichever context runs it.
///
/// Running consumes the task, so a producer cannot touch it again once it
/// has been handed to an executor.
pub struct Task {
    id: TaskId,
    label: &'static str,
    func: Box<dyn FnOnce() + Send + 'static>,
    created: Instant,
}

impl Task {
    /// Create a task from a closure that already owns everything it needs.
    pub fn new<F>(label: &'static str, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            label,
            func: Box::new(f),
            created: Instant::now(),
        }
    }

    /// Create a task from a callable and the argument value it will be
    /// invoked with. Multi-argument callbacks pass a tuple.
    pub fn with_args<F, A>(label: &'static str, f: F, args: A) -> Self
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        Task::new(label, move || f(args))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Time since the task was created on the producer side.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Invoke the callable with its arguments.
    pub fn run(self) {
        (self.func)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("created", &self.created)
            .finish()
    }
}
