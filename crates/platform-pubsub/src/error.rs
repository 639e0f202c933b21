//! Error types for receiving from a subscription channel
//!
//! Publishing, subscribing and unsubscribing never fail: publishing to a topic
//! nobody listens on and unsubscribing twice are both no-ops. The only
//! recoverable conditions are on the receiving side, where a reader can find
//! the channel empty or closed.

use thiserror::Error;

/// Error returned by a blocking or async receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    /// The subscription was closed and every buffered event has been read
    #[error("Channel closed")]
    Closed,
}

/// Error returned by [`Receiver::try_recv`](crate::Receiver::try_recv).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// No event is buffered right now
    #[error("Channel empty")]
    Empty,

    /// The subscription was closed and every buffered event has been read
    #[error("Channel closed")]
    Closed,
}

/// Error returned by [`Receiver::recv_timeout`](crate::Receiver::recv_timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvTimeoutError {
    /// No event arrived before the deadline
    #[error("Timed out waiting on channel")]
    Timeout,

    /// The subscription was closed and every buffered event has been read
    #[error("Channel closed")]
    Closed,
}

impl From<RecvError> for TryRecvError {
    fn from(_: RecvError) -> Self {
        TryRecvError::Closed
    }
}

impl From<RecvError> for RecvTimeoutError {
    fn from(_: RecvError) -> Self {
        RecvTimeoutError::Closed
    }
}

impl TryRecvError {
    /// Check if the channel is closed for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, TryRecvError::Closed)
    }
}

impl RecvTimeoutError {
    /// Check if the channel is closed for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, RecvTimeoutError::Closed)
    }
}
