//! Bus configuration
//!
//! The only tunable is the capacity of each subscription's delivery channel.
//! It is resolved once when a [`Bus`](crate::Bus) is built and stays fixed for
//! the life of that bus.

use serde::{Deserialize, Serialize};

/// Capacity of subscription channels when the buffer size is not configured.
pub const DEFAULT_BUFFER_SIZE: usize = 10;

/// Configuration for a [`Bus`](crate::Bus).
///
/// # Example
///
/// ```rust
/// use platform_pubsub::{BusConfig, DEFAULT_BUFFER_SIZE};
///
/// assert_eq!(BusConfig::default().capacity(), DEFAULT_BUFFER_SIZE);
/// assert_eq!(BusConfig::new(-1).capacity(), 0);
/// assert_eq!(BusConfig::new(64).capacity(), 64);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Buffer size for subscription channels.
    ///
    /// - `0` (or unset): [`DEFAULT_BUFFER_SIZE`]
    /// - negative: unbuffered, every send waits for a reader
    /// - positive: exactly that many events
    pub buffer_size: i64,
}

impl BusConfig {
    /// Create a configuration with a raw buffer size.
    pub fn new(buffer_size: i64) -> Self {
        Self { buffer_size }
    }

    /// Create a configuration for unbuffered (rendezvous) channels.
    pub fn unbuffered() -> Self {
        Self { buffer_size: -1 }
    }

    /// Resolve the channel capacity this configuration describes.
    pub fn capacity(&self) -> usize {
        match self.buffer_size {
            0 => DEFAULT_BUFFER_SIZE,
            n if n < 0 => 0,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        }
    }
}
