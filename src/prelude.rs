pub use crate::channel::HandoffChannel;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::engine::{
    Engine, EngineError, ErrorCode, ResponseHeaders, ResponseTrailers, SimulatedEngine,
    StreamEvent, StreamId,
};
pub use crate::error::{Error, Result};
pub use crate::executor::{
    CooperativeExecutor, Executor, ExecutorExt, ExecutorKind, PanicStrategy,
    SerializingExecutor, SharedExecutor, Task,
};
pub use crate::router::StreamCallbacks;
pub use crate::session::Session;
pub use crate::stream::{StreamRecord, StreamRecorder, Terminal};

#[cfg(feature = "tokio")]
pub use crate::executor::EventLoopExecutor;
