//! Cross-thread handoff primitive.
//!
//! The only piece of the crate that is shared between threads: every
//! executor that decouples delivery from the engine's thread moves tasks
//! through a [`HandoffChannel`] or through its runtime's own thread-safe
//! submission API.

pub mod handoff;

pub use handoff::{HandoffChannel, Recv, SendError};
