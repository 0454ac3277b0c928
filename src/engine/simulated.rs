//! Stand-in engine that fires callbacks from threads it owns.

use super::{
    Engine, EngineError, OnComplete, OnData, OnEngineRunning, OnError, OnHeaders, OnTrailers,
    OnCancel, ResponseHeaders, ResponseTrailers, StreamCallbackRegistry, StreamId,
};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// One callback the engine can fire on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Headers(ResponseHeaders, bool),
    Data(Vec<u8>, bool),
    Trailers(ResponseTrailers),
    Complete,
    Error(EngineError),
    Cancel,
}

#[derive(Default)]
struct Slots {
    on_headers: Option<Arc<OnHeaders>>,
    on_data: Option<Arc<OnData>>,
    on_trailers: Option<Arc<OnTrailers>>,
    on_complete: Option<Arc<OnComplete>>,
    on_error: Option<Arc<OnError>>,
    on_cancel: Option<Arc<OnCancel>>,
}

#[derive(Debug)]
pub struct SimulatedEngine {
    live: Arc<AtomicBool>,
    started: AtomicBool,
    main_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
            started: AtomicBool::new(false),
            main_thread: Mutex::new(None),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for SimulatedEngine {
    type Stream = SimulatedStream;

    fn run(&self, on_running: OnEngineRunning) -> Result<()> {
        if !self.is_live() {
            return Err(Error::engine("engine terminated"));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::engine("engine already running"));
        }

        let handle = thread::Builder::new()
            .name("engine-main".to_string())
            .spawn(move || {
                debug!("simulated engine running");
                on_running();
            })
            .map_err(|e| Error::engine(format!("spawn failed: {}", e)))?;

        *self.main_thread.lock() = Some(handle);
        Ok(())
    }

    fn new_stream(&self, id: StreamId) -> Result<SimulatedStream> {
        if !self.is_live() {
            return Err(Error::engine("engine terminated"));
        }

        Ok(SimulatedStream {
            id,
            slots: Arc::new(RwLock::new(Slots::default())),
            live: self.live.clone(),
        })
    }

    fn terminate(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.main_thread.lock().take() {
            // terminate() may be reached from inside on_running itself
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("engine main thread panicked");
            }
        }
        debug!("simulated engine terminated");
    }
}

pub struct SimulatedStream {
    id: StreamId,
    slots: Arc<RwLock<Slots>>,
    live: Arc<AtomicBool>,
}

impl SimulatedStream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Handle for firing this stream's callbacks from any thread.
    pub fn driver(&self) -> StreamDriver {
        StreamDriver {
            id: self.id,
            slots: self.slots.clone(),
            live: self.live.clone(),
        }
    }
}

impl StreamCallbackRegistry for SimulatedStream {
    fn set_on_headers(&mut self, f: OnHeaders) {
        self.slots.write().on_headers = Some(Arc::new(f));
    }

    fn set_on_data(&mut self, f: OnData) {
        self.slots.write().on_data = Some(Arc::new(f));
    }

    fn set_on_trailers(&mut self, f: OnTrailers) {
        self.slots.write().on_trailers = Some(Arc::new(f));
    }

    fn set_on_complete(&mut self, f: OnComplete) {
        self.slots.write().on_complete = Some(Arc::new(f));
    }

    fn set_on_error(&mut self, f: OnError) {
        self.slots.write().on_error = Some(Arc::new(f));
    }

    fn set_on_cancel(&mut self, f: OnCancel) {
        self.slots.write().on_cancel = Some(Arc::new(f));
    }
}

impl std::fmt::Debug for SimulatedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedStream").field("id", &self.id).finish()
    }
}

/// Fires a stream's registered callbacks, the way the engine's worker
/// threads would.
#[derive(Clone)]
pub struct StreamDriver {
    id: StreamId,
    slots: Arc<RwLock<Slots>>,
    live: Arc<AtomicBool>,
}

impl StreamDriver {
    /// Fire one event on the calling thread. Returns false when the engine
    /// has been terminated and nothing fired. An unregistered slot is
    /// skipped and still counts as fired.
    ///
    /// The terminated check happens once, before the callback runs. A
    /// `terminate` racing with this call on another thread does not stop a
    /// callback that already passed the check.
    pub fn fire(&self, event: StreamEvent) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        trace!(stream = %self.id, ?event, "engine firing");

        // Clone the slot out so no lock is held while the callback runs.
        match event {
            StreamEvent::Headers(headers, end_stream) => {
                let slot = self.slots.read().on_headers.clone();
                if let Some(f) = slot {
                    f(headers, end_stream);
                }
            }
            StreamEvent::Data(bytes, end_stream) => {
                let slot = self.slots.read().on_data.clone();
                if let Some(f) = slot {
                    f(bytes, end_stream);
                }
            }
            StreamEvent::Trailers(trailers) => {
                let slot = self.slots.read().on_trailers.clone();
                if let Some(f) = slot {
                    f(trailers);
                }
            }
            StreamEvent::Complete => {
                let slot = self.slots.read().on_complete.clone();
                if let Some(f) = slot {
                    f();
                }
            }
            StreamEvent::Error(error) => {
                let slot = self.slots.read().on_error.clone();
                if let Some(f) = slot {
                    f(error);
                }
            }
            StreamEvent::Cancel => {
                let slot = self.slots.read().on_cancel.clone();
                if let Some(f) = slot {
                    f();
                }
            }
        }
        true
    }

    pub fn headers(&self, headers: ResponseHeaders, end_stream: bool) -> bool {
        self.fire(StreamEvent::Headers(headers, end_stream))
    }

    pub fn data(&self, bytes: Vec<u8>, end_stream: bool) -> bool {
        self.fire(StreamEvent::Data(bytes, end_stream))
    }

    pub fn complete(&self) -> bool {
        self.fire(StreamEvent::Complete)
    }

    pub fn error(&self, error: EngineError) -> bool {
        self.fire(StreamEvent::Error(error))
    }

    pub fn cancel(&self) -> bool {
        self.fire(StreamEvent::Cancel)
    }

    /// Replay `events` in order on a fresh engine worker thread.
    pub fn play(&self, events: Vec<StreamEvent>) -> Result<JoinHandle<()>> {
        let driver = self.clone();
        thread::Builder::new()
            .name(format!("engine-{}", self.id))
            .spawn(move || {
                for event in events {
                    if !driver.fire(event) {
                        break;
                    }
                }
            })
            .map_err(|e| Error::engine(format!("spawn failed: {}", e)))
    }
}

impl std::fmt::Debug for StreamDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDriver").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_run_fires_on_engine_thread() {
        let engine = SimulatedEngine::new();
        let (tx, rx) = mpsc::channel();

        engine
            .run(Box::new(move || {
                tx.send(thread::current().name().map(str::to_owned)).unwrap();
            }))
            .unwrap();

        assert_eq!(rx.recv().unwrap().as_deref(), Some("engine-main"));
        assert!(engine.run(Box::new(|| {})).is_err());
        engine.terminate();
    }

    #[test]
    fn test_play_fires_registered_slots_in_order() {
        let engine = SimulatedEngine::new();
        let mut stream = engine.new_stream(StreamId(1)).unwrap();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let log = fired.clone();
        stream.set_on_headers(Box::new(move |h: ResponseHeaders, _| {
            log.lock().push(format!("headers {}", h.status()));
        }));
        let log = fired.clone();
        stream.set_on_data(Box::new(move |b: Vec<u8>, _| {
            log.lock().push(format!("data {}", b.len()));
        }));
        let log = fired.clone();
        stream.set_on_complete(Box::new(move || log.lock().push("complete".to_string())));

        stream
            .driver()
            .play(vec![
                StreamEvent::Headers(ResponseHeaders::new(204), false),
                StreamEvent::Trailers(ResponseTrailers::new()),
                StreamEvent::Data(vec![1, 2, 3], true),
                StreamEvent::Complete,
            ])
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(*fired.lock(), vec!["headers 204", "data 3", "complete"]);
    }

    #[test]
    fn test_terminate_survives_panicking_main_thread() {
        let engine = SimulatedEngine::new();
        engine
            .run(Box::new(|| panic!("engine failed to come up")))
            .unwrap();

        engine.terminate();
        assert!(!engine.is_live());
        assert!(engine.main_thread.lock().is_none());
    }

    #[test]
    fn test_terminated_engine_stops_firing() {
        let engine = SimulatedEngine::new();
        let stream = engine.new_stream(StreamId(7)).unwrap();
        let driver = stream.driver();

        engine.terminate();

        assert!(!driver.complete());
        assert!(engine.new_stream(StreamId(8)).is_err());
    }
}
