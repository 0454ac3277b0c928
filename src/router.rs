//! Per-stream glue between engine callback slots and an executor.
//!
//! The engine never runs caller code directly. Each slot the caller fills in
//! is registered with the engine as a small closure that packs the fired
//! arguments into a [`Task`] and hands it to the stream's executor.

use crate::engine::{
    EngineError, ResponseHeaders, ResponseTrailers, StreamCallbackRegistry, StreamId,
};
use crate::executor::{Executor, SharedExecutor, Task};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type HeadersFn = Arc<dyn Fn(ResponseHeaders, bool) + Send + Sync>;
type DataFn = Arc<dyn Fn(Vec<u8>, bool) + Send + Sync>;
type TrailersFn = Arc<dyn Fn(ResponseTrailers) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(EngineError) + Send + Sync>;
type UnitFn = Arc<dyn Fn() + Send + Sync>;

/// The caller's callbacks for one stream. Unset slots are never registered
/// with the engine.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    on_headers: Option<HeadersFn>,
    on_data: Option<DataFn>,
    on_trailers: Option<TrailersFn>,
    on_complete: Option<UnitFn>,
    on_error: Option<ErrorFn>,
    on_cancel: Option<UnitFn>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(ResponseHeaders, bool) + Send + Sync + 'static,
    {
        self.on_headers = Some(Arc::new(f));
        self
    }

    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<u8>, bool) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(f));
        self
    }

    pub fn on_trailers<F>(mut self, f: F) -> Self
    where
        F: Fn(ResponseTrailers) + Send + Sync + 'static,
    {
        self.on_trailers = Some(Arc::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(EngineError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_cancel<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancel = Some(Arc::new(f));
        self
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        [
            self.on_headers.is_some(),
            self.on_data.is_some(),
            self.on_trailers.is_some(),
            self.on_complete.is_some(),
            self.on_error.is_some(),
            self.on_cancel.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_headers", &self.on_headers.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_trailers", &self.on_trailers.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

/// Binds a stream's callbacks to an executor.
///
/// The router does not police the engine's terminal contract: if the engine
/// fired both complete and error, both would be delivered. Consumers such as
/// [`StreamRecorder`](crate::stream::StreamRecorder) keep only the first
/// terminal.
pub struct CallbackRouter {
    stream: StreamId,
    executor: SharedExecutor,
    callbacks: StreamCallbacks,
}

impl CallbackRouter {
    pub fn new(stream: StreamId, executor: SharedExecutor, callbacks: StreamCallbacks) -> Self {
        Self {
            stream,
            executor,
            callbacks,
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Register a forwarding closure with the engine for every populated slot.
    pub fn install<R>(self, registry: &mut R)
    where
        R: StreamCallbackRegistry + ?Sized,
    {
        let CallbackRouter {
            stream,
            executor,
            callbacks,
        } = self;

        trace!(%stream, slots = callbacks.len(), "installing callback router");

        if let Some(user) = callbacks.on_headers {
            let executor = executor.clone();
            registry.set_on_headers(Box::new(move |headers: ResponseHeaders, end_stream: bool| {
                let user = user.clone();
                let task = Task::with_args(
                    "on_headers",
                    move |(headers, end_stream): (ResponseHeaders, bool)| user(headers, end_stream),
                    (headers, end_stream),
                );
                route(&executor, stream, task);
            }));
        }

        if let Some(user) = callbacks.on_data {
            let executor = executor.clone();
            registry.set_on_data(Box::new(move |bytes: Vec<u8>, end_stream: bool| {
                let user = user.clone();
                let task = Task::with_args(
                    "on_data",
                    move |(bytes, end_stream): (Vec<u8>, bool)| user(bytes, end_stream),
                    (bytes, end_stream),
                );
                route(&executor, stream, task);
            }));
        }

        if let Some(user) = callbacks.on_trailers {
            let executor = executor.clone();
            registry.set_on_trailers(Box::new(move |trailers: ResponseTrailers| {
                let user = user.clone();
                let task = Task::with_args(
                    "on_trailers",
                    move |trailers: ResponseTrailers| user(trailers),
                    trailers,
                );
                route(&executor, stream, task);
            }));
        }

        if let Some(user) = callbacks.on_complete {
            let executor = executor.clone();
            registry.set_on_complete(Box::new(move || {
                let user = user.clone();
                route(&executor, stream, Task::new("on_complete", move || user()));
            }));
        }

        if let Some(user) = callbacks.on_error {
            let executor = executor.clone();
            registry.set_on_error(Box::new(move |error: EngineError| {
                let user = user.clone();
                let task =
                    Task::with_args("on_error", move |error: EngineError| user(error), error);
                route(&executor, stream, task);
            }));
        }

        if let Some(user) = callbacks.on_cancel {
            registry.set_on_cancel(Box::new(move || {
                let user = user.clone();
                route(&executor, stream, Task::new("on_cancel", move || user()));
            }));
        }
    }
}

impl fmt::Debug for CallbackRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRouter")
            .field("stream", &self.stream)
            .field("executor", &self.executor.kind())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

// Runs on the engine's thread.
fn route(executor: &SharedExecutor, stream: StreamId, task: Task) {
    let id = task.id();
    let label = task.label();

    match executor.execute(task) {
        Ok(()) => trace!(%stream, task = %id, label, "routed"),
        Err(err) => debug!(%stream, task = %id, label, %err, "callback dropped"),
    }
}
