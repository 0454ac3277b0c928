//! Observed state of a stream, built from delivered callbacks.

use crate::engine::{EngineError, ResponseHeaders, ResponseTrailers};
use crate::router::StreamCallbacks;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    Complete,
    Error,
    Cancel,
}

impl Terminal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminal::Complete => "complete",
            Terminal::Error => "error",
            Terminal::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    Headers,
    Data,
    Trailers,
    Complete,
    Error,
    Cancel,
}

impl From<Terminal> for StreamEventKind {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Complete => StreamEventKind::Complete,
            Terminal::Error => StreamEventKind::Error,
            Terminal::Cancel => StreamEventKind::Cancel,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRecord {
    pub status: Option<u16>,
    pub bytes_received: usize,
    pub trailers: bool,
    pub terminal: Option<Terminal>,
    pub error: Option<EngineError>,
    /// Deliveries in the order they ran.
    pub events: Vec<StreamEventKind>,
}

type FinishHook = Box<dyn FnOnce(&StreamRecord) + Send + 'static>;

struct Shared {
    record: Mutex<StreamRecord>,
    finished: Condvar,
    on_finish: Mutex<Option<FinishHook>>,
}

/// Records what a stream's callbacks observed.
///
/// Only the first terminal (complete, error or cancel) is kept; a second one
/// is logged and ignored.
#[derive(Clone)]
pub struct StreamRecorder {
    shared: Arc<Shared>,
}

impl StreamRecorder {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                record: Mutex::new(StreamRecord::default()),
                finished: Condvar::new(),
                on_finish: Mutex::new(None),
            }),
        }
    }

    /// Run `f` with the final record once the terminal callback is
    /// delivered, in whatever context delivered it.
    pub fn on_finish<F>(self, f: F) -> Self
    where
        F: FnOnce(&StreamRecord) + Send + 'static,
    {
        *self.shared.on_finish.lock() = Some(Box::new(f));
        self
    }

    /// Callbacks that feed this recorder.
    pub fn callbacks(&self) -> StreamCallbacks {
        let (headers, data, trailers) = (self.clone(), self.clone(), self.clone());
        let (complete, error, cancel) = (self.clone(), self.clone(), self.clone());

        StreamCallbacks::new()
            .on_headers(move |h: ResponseHeaders, _| headers.record_headers(&h))
            .on_data(move |bytes: Vec<u8>, _| data.record_data(bytes.len()))
            .on_trailers(move |_: ResponseTrailers| trailers.record_trailers())
            .on_complete(move || complete.finish(Terminal::Complete, None))
            .on_error(move |e: EngineError| error.finish(Terminal::Error, Some(e)))
            .on_cancel(move || cancel.finish(Terminal::Cancel, None))
    }

    pub fn snapshot(&self) -> StreamRecord {
        self.shared.record.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.record.lock().terminal.is_some()
    }

    /// Block the calling thread until a terminal is recorded or `timeout`
    /// passes.
    pub fn wait_finished(&self, timeout: Duration) -> Option<StreamRecord> {
        let deadline = Instant::now() + timeout;
        let mut record = self.shared.record.lock();
        while record.terminal.is_none() {
            if self
                .shared
                .finished
                .wait_until(&mut record, deadline)
                .timed_out()
            {
                break;
            }
        }
        record.terminal.map(|_| record.clone())
    }

    fn record_headers(&self, headers: &ResponseHeaders) {
        let mut record = self.shared.record.lock();
        record.status = Some(headers.status());
        record.events.push(StreamEventKind::Headers);
    }

    fn record_data(&self, len: usize) {
        let mut record = self.shared.record.lock();
        record.bytes_received += len;
        record.events.push(StreamEventKind::Data);
    }

    fn record_trailers(&self) {
        let mut record = self.shared.record.lock();
        record.trailers = true;
        record.events.push(StreamEventKind::Trailers);
    }

    fn finish(&self, terminal: Terminal, error: Option<EngineError>) {
        let snapshot = {
            let mut record = self.shared.record.lock();
            if let Some(first) = record.terminal {
                warn!(%first, ignored = %terminal, "second terminal callback ignored");
                return;
            }
            record.terminal = Some(terminal);
            record.error = error;
            record.events.push(terminal.into());
            self.shared.finished.notify_all();
            record.clone()
        };

        let hook = self.shared.on_finish.lock().take();
        if let Some(hook) = hook {
            hook(&snapshot);
        }
    }
}

impl Default for StreamRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRecorder")
            .field("record", &*self.shared.record.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorCode;
    use std::thread;

    #[test]
    fn test_terminal_display() {
        assert_eq!(Terminal::Complete.to_string(), "complete");
        assert_eq!(Terminal::Cancel.as_str(), "cancel");
    }

    #[test]
    fn test_first_terminal_wins() {
        let recorder = StreamRecorder::new();
        recorder.finish(Terminal::Error, Some(EngineError::new(ErrorCode::RequestTimeout, "slow")));
        recorder.finish(Terminal::Complete, None);

        let record = recorder.snapshot();
        assert_eq!(record.terminal, Some(Terminal::Error));
        assert_eq!(record.events, vec![StreamEventKind::Error]);
        assert_eq!(record.error.unwrap().code, ErrorCode::RequestTimeout);
    }

    #[test]
    fn test_wait_finished_wakes_on_terminal() {
        let recorder = StreamRecorder::new();

        let other = recorder.clone();
        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            other.record_data(5);
            other.finish(Terminal::Cancel, None);
        });

        let record = recorder.wait_finished(Duration::from_secs(5)).unwrap();
        finisher.join().unwrap();

        assert_eq!(record.terminal, Some(Terminal::Cancel));
        assert_eq!(record.bytes_received, 5);
    }

    #[test]
    fn test_wait_finished_times_out() {
        let recorder = StreamRecorder::new();
        assert!(recorder.wait_finished(Duration::from_millis(10)).is_none());
        assert!(!recorder.is_finished());
    }

    #[test]
    fn test_finish_hook_runs_once() {
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let recorder = StreamRecorder::new().on_finish(move |record| {
            assert_eq!(record.terminal, Some(Terminal::Complete));
            *c.lock() += 1;
        });

        recorder.finish(Terminal::Complete, None);
        recorder.finish(Terminal::Complete, None);

        assert_eq!(*count.lock(), 1);
    }
}
