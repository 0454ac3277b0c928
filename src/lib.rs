//! Courier - cross-thread callback dispatch
//!
//! A native network engine fires stream callbacks on threads it owns. Courier
//! moves each of those callbacks into the context the caller actually lives
//! in, without ever running caller code on an engine thread unless asked to.
//!
//! # Quick Start
//!
//! ```no_run
//! use courier::prelude::*;
//! use futures::executor::LocalPool;
//! use std::sync::Arc;
//!
//! let mut pool = LocalPool::new();
//! let executor = CooperativeExecutor::new(&pool.spawner(), &Config::default()).unwrap();
//! let session = Session::new(SimulatedEngine::new(), Arc::new(executor));
//!
//! let recorder = StreamRecorder::new();
//! let stream = session.open_stream(recorder.callbacks()).unwrap();
//!
//! stream.driver().play(vec![
//!     StreamEvent::Headers(ResponseHeaders::new(200), false),
//!     StreamEvent::Data(b"hello".to_vec(), true),
//!     StreamEvent::Complete,
//! ]).unwrap();
//!
//! while !recorder.is_finished() {
//!     pool.run_until_stalled();
//! }
//! println!("{:?}", recorder.snapshot());
//! ```
//!
//! # Components
//!
//! - **Handoff channel**: blocking and async FIFO between engine threads and
//!   a consumer
//! - **Executors**: cooperative (single-threaded scheduler), event loop
//!   (tokio handle) and serializing (inline, one at a time)
//! - **Callback router**: per-stream glue turning engine callbacks into tasks
//! - **Session**: explicit engine and executor lifetime

#![warn(missing_debug_implementations)]

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod prelude;
pub mod router;
pub mod session;
pub mod stream;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorKind, SharedExecutor, Task};
pub use router::{CallbackRouter, StreamCallbacks};
pub use session::Session;
pub use stream::{StreamRecord, StreamRecorder, Terminal};
