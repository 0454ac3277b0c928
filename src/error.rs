pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("executor shut down: {0}")]
    ExecutorShutdown(String),

    #[error("handoff channel closed")]
    ChannelClosed,

    #[error("no event loop running on this thread")]
    NoEventLoop,

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("session terminated")]
    SessionTerminated,
}

impl Error {
    pub fn shutdown<S: Into<String>>(executor: S) -> Self {
        Error::ExecutorShutdown(executor.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Error::Engine(msg.into())
    }

    /// True when the error means the target context is gone and the task
    /// was dropped rather than delivered.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, Error::ExecutorShutdown(_) | Error::ChannelClosed)
    }
}

impl From<futures::task::SpawnError> for Error {
    fn from(err: futures::task::SpawnError) -> Self {
        Error::Spawn(err.to_string())
    }
}
