//! Unbounded FIFO handoff between producer threads and one consumer context.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    // at most one async consumer parks here
    waker: Option<Waker>,
}

/// Thread-safe, unbounded FIFO queue with blocking and async receive.
///
/// Every mutation of the queue happens under one lock, and a consumer checks
/// for an empty queue and registers its wait while holding that same lock.
/// A `put` racing with a consumer that is about to sleep is therefore always
/// observed: either the consumer sees the value, or it is already waiting
/// when the producer signals.
///
/// The queue never pushes back on producers. If callbacks arrive faster than
/// the consumer drains them, memory grows without bound; pacing producers is
/// the caller's responsibility.
pub struct HandoffChannel<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> HandoffChannel<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                closed: false,
                waker: None,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue `value` and signal the consumer. Never blocks; fails only once
    /// the channel is closed, handing the value back.
    pub fn put(&self, value: T) -> Result<(), SendError<T>> {
        let waker = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(SendError(value));
            }
            state.queue.push_back(value);
            self.available.notify_one();
            state.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Remove and return the oldest value, blocking the calling thread while
    /// the queue is empty. Returns `None` once the channel is closed.
    pub fn get(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`get`](Self::get) but gives up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.queue.pop_front();
            }
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.state.lock().queue.pop_front()
    }

    /// Async receive for a consumer running inside a cooperative scheduler.
    /// Resolves to `None` once the channel is closed.
    ///
    /// Only one task should await `recv` at a time; a second one would
    /// replace the first one's waker.
    pub fn recv(&self) -> Recv<'_, T> {
        Recv { channel: self }
    }

    /// Close the channel, dropping every value still queued and waking all
    /// waiters. Returns the number of values dropped. Idempotent.
    pub fn close(&self) -> usize {
        let (pending, waker) = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            self.available.notify_all();
            (std::mem::take(&mut state.queue), state.waker.take())
        };

        if let Some(waker) = waker {
            waker.wake();
        }

        // Values may run arbitrary Drop code; keep that outside the lock.
        let dropped = pending.len();
        drop(pending);
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }
}

impl<T> Default for HandoffChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandoffChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HandoffChannel")
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .field("consumer_parked", &state.waker.is_some())
            .finish()
    }
}

/// Future returned by [`HandoffChannel::recv`].
#[must_use = "futures do nothing unless polled"]
pub struct Recv<'a, T> {
    channel: &'a HandoffChannel<T>,
}

impl<T> Future for Recv<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.channel.state.lock();

        if let Some(value) = state.queue.pop_front() {
            return Poll::Ready(Some(value));
        }
        if state.closed {
            return Poll::Ready(None);
        }

        match &mut state.waker {
            Some(existing) if existing.will_wake(cx.waker()) => {}
            slot => *slot = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for Recv<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recv").finish_non_exhaustive()
    }
}

/// Returned by [`HandoffChannel::put`] when the channel is closed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError { .. }")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sending on a closed handoff channel")
    }
}

impl<T> std::error::Error for SendError<T> {}

impl<T> From<SendError<T>> for crate::error::Error {
    fn from(_: SendError<T>) -> Self {
        crate::error::Error::ChannelClosed
    }
}
