//! Bounded, closable delivery channel
//!
//! Each subscription owns one of these queues. Publishers push into it from
//! fanout, the subscriber reads from it in FIFO order. The channel has three
//! phases:
//!
//! - **Open**: sends enqueue, blocking while the queue is full.
//! - **Detached**: sends are discarded and blocked senders are released.
//!   Events already buffered stay readable.
//! - **Closed**: no sends are allowed. Readers drain what is left and then
//!   see end-of-stream.
//!
//! A capacity of zero makes the channel a rendezvous: `send` returns only once
//! a reader has taken the value.
//!
//! Sending on a closed channel is a bug in the bus, not caller misuse, and
//! panics. Only the bus holds the write half, so callers get a [`Receiver`]
//! and nothing else:
//!
//! ```compile_fail
//! let (tx, _rx) = platform_pubsub::channel::bounded::<u8>(1);
//! tx.close();
//! tx.send(1);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::error::{RecvError, RecvTimeoutError, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Detached,
    Closed,
}

struct State<T> {
    queue: VecDeque<T>,
    phase: Phase,
    /// Total values ever enqueued
    pushed: u64,
    /// Total values ever taken by a reader
    popped: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    /// Signalled when a value is enqueued or the channel closes.
    not_empty: Condvar,
    /// Signalled when a value is taken or the channel stops accepting.
    not_full: Condvar,
    /// Async counterpart of `not_empty`.
    readable: Notify,
}

impl<T> Shared<T> {
    /// Slots a sender may fill before blocking. A rendezvous channel still
    /// parks one value in the queue while it waits for the hand-off.
    fn slots(&self) -> usize {
        self.capacity.max(1)
    }

    fn take(&self, state: &mut MutexGuard<'_, State<T>>) -> Option<T> {
        let value = state.queue.pop_front()?;
        state.popped += 1;
        self.not_full.notify_all();
        Some(value)
    }

    fn wake_readers(&self) {
        self.not_empty.notify_all();
        self.readable.notify_waiters();
    }
}

/// Create a bounded channel holding at most `capacity` values.
pub(crate) fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            phase: Phase::Open,
            pushed: 0,
            popped: 0,
        }),
        capacity,
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
        readable: Notify::new(),
    });

    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

/// Write half of a delivery channel. Only the bus writes to subscription
/// channels.
pub(crate) struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Enqueue a value, blocking while the channel is full.
    ///
    /// Returns `true` if the value was enqueued and `false` if it was
    /// discarded because the channel was detached.
    ///
    /// # Panics
    ///
    /// Panics if the channel is closed.
    pub(crate) fn send(&self, value: T) -> bool {
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        loop {
            match state.phase {
                Phase::Closed => panic!("send on a closed subscription channel"),
                Phase::Detached => return false,
                Phase::Open => {}
            }
            if state.queue.len() < shared.slots() {
                break;
            }
            shared.not_full.wait(&mut state);
        }

        state.queue.push_back(value);
        state.pushed += 1;
        let ticket = state.pushed;
        shared.wake_readers();

        if shared.capacity == 0 {
            while state.popped < ticket && state.phase == Phase::Open {
                shared.not_full.wait(&mut state);
            }
        }

        true
    }

    /// Stop accepting values and release any blocked sender.
    ///
    /// Returns `false` if the channel had already left the open phase.
    pub(crate) fn detach(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.phase != Phase::Open {
            return false;
        }
        state.phase = Phase::Detached;
        self.shared.not_full.notify_all();
        true
    }

    /// Close the channel. Readers drain buffered values, then see end-of-stream.
    ///
    /// Returns `false` if the channel was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.phase == Phase::Closed {
            return false;
        }
        state.phase = Phase::Closed;
        self.shared.not_full.notify_all();
        self.shared.wake_readers();
        true
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Read half of a delivery channel.
///
/// Cloning a receiver yields another handle on the same queue; each value is
/// read by exactly one handle.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Wait for the next value.
    ///
    /// Returns [`RecvError::Closed`] once the channel is closed and drained.
    pub fn recv(&self) -> Result<T, RecvError> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        loop {
            if let Some(value) = shared.take(&mut state) {
                return Ok(value);
            }
            if state.phase == Phase::Closed {
                return Err(RecvError::Closed);
            }
            shared.not_empty.wait(&mut state);
        }
    }

    /// Take the next value if one is buffered.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        match shared.take(&mut state) {
            Some(value) => Ok(value),
            None if state.phase == Phase::Closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Wait for the next value, giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        loop {
            if let Some(value) = shared.take(&mut state) {
                return Ok(value);
            }
            if state.phase == Phase::Closed {
                return Err(RecvTimeoutError::Closed);
            }
            if shared.not_empty.wait_until(&mut state, deadline).timed_out() {
                return match shared.take(&mut state) {
                    Some(value) => Ok(value),
                    None if state.phase == Phase::Closed => Err(RecvTimeoutError::Closed),
                    None => Err(RecvTimeoutError::Timeout),
                };
            }
        }
    }

    /// Wait for the next value without blocking the executor thread.
    pub async fn recv_async(&self) -> Result<T, RecvError> {
        loop {
            // Register interest before checking the queue so a send landing
            // in between still wakes us.
            let mut notified = std::pin::pin!(self.shared.readable.notified());
            notified.as_mut().enable();

            match self.try_recv() {
                Ok(value) => return Ok(value),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
                Err(TryRecvError::Empty) => {}
            }

            notified.await;
        }
    }

    /// Blocking iterator over values, ending when the channel is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { receiver: self }
    }

    /// Maximum number of values the channel buffers.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of values currently buffered.
    ///
    /// On an unbuffered channel this is 1 while a sender waits for its value
    /// to be taken, even though [`capacity`](Self::capacity) is 0.
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Check if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the channel is closed. Buffered values may still be readable.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().phase == Phase::Closed
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Borrowing iterator returned by [`Receiver::iter`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

/// Owning iterator over a [`Receiver`].
#[derive(Debug)]
pub struct IntoIter<T> {
    receiver: Receiver<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

impl<'a, T> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> IntoIterator for Receiver<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { receiver: self }
    }
}
