//! The network engine's side of the contract.
//!
//! The engine itself is not part of this crate. It owns its threads, fires
//! stream callbacks from them and exposes a registration API per stream.
//! These are the shapes the dispatch layer relies on; [`simulated`] holds a
//! stand-in engine that fires callbacks from its own threads.

pub mod simulated;

pub use simulated::{SimulatedEngine, SimulatedStream, StreamDriver, StreamEvent};

use crate::error::Result;
use std::fmt;

/// Per-session stream identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

pub type OnHeaders = Box<dyn Fn(ResponseHeaders, bool) + Send + Sync + 'static>;
pub type OnData = Box<dyn Fn(Vec<u8>, bool) + Send + Sync + 'static>;
pub type OnTrailers = Box<dyn Fn(ResponseTrailers) + Send + Sync + 'static>;
pub type OnComplete = Box<dyn Fn() + Send + Sync + 'static>;
pub type OnError = Box<dyn Fn(EngineError) + Send + Sync + 'static>;
pub type OnCancel = Box<dyn Fn() + Send + Sync + 'static>;
pub type OnEngineRunning = Box<dyn FnOnce() + Send + 'static>;

/// Callback registration for one engine stream.
///
/// Every registered closure may be invoked from any engine-owned thread.
/// At most one of complete / error / cancel fires per stream, and slots that
/// were never registered are simply skipped by the engine.
pub trait StreamCallbackRegistry {
    fn set_on_headers(&mut self, f: OnHeaders);
    fn set_on_data(&mut self, f: OnData);
    fn set_on_trailers(&mut self, f: OnTrailers);
    fn set_on_complete(&mut self, f: OnComplete);
    fn set_on_error(&mut self, f: OnError);
    fn set_on_cancel(&mut self, f: OnCancel);
}

/// An engine instance owned by a [`Session`](crate::session::Session).
pub trait Engine: Send + Sync {
    type Stream: StreamCallbackRegistry;

    /// Start the engine. `on_running` fires once, from an engine thread,
    /// when the engine is ready to open streams.
    fn run(&self, on_running: OnEngineRunning) -> Result<()>;

    fn new_stream(&self, id: StreamId) -> Result<Self::Stream>;

    /// Stop the engine. Once this returns no new callback starts; one that
    /// was already being fired on another engine thread may still finish.
    fn terminate(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaders {
    status: u16,
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            entries: Vec::new(),
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTrailers {
    entries: Vec<(String, String)>,
}

impl ResponseTrailers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trailer<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Undefined,
    StreamReset,
    ConnectionFailure,
    BufferLimitExceeded,
    RequestTimeout,
}

/// Error reported by the engine through a stream's error callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub attempt_count: Option<u32>,
}

impl EngineError {
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            attempt_count: None,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempt_count = Some(attempts);
        self
    }
}
