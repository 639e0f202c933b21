//! # Platform PubSub
//!
//! This crate provides an in-process publish/subscribe bus for the Relay
//! platform. Publishers tag events with one or more topic keys; subscribers
//! join a set of keys and read events from an ordered, bounded channel.
//!
//! ## Overview
//!
//! The platform-pubsub crate handles:
//! - **Topic Registry**: Topics created on first subscribe, evicted when the
//!   last subscriber leaves
//! - **Fanout**: Each publish reaches every subscription of every listed key,
//!   exactly once per subscription
//! - **Backpressure**: A full subscription channel blocks the publisher rather
//!   than dropping events
//! - **Race-free Teardown**: Unsubscribe leaves every topic before the channel
//!   closes, so no publisher ever writes to a closed channel
//!
//! Transports (HTTP streaming, websockets) and event type definitions live
//! with the applications; this crate is generic over the event type and never
//! inspects it.
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use platform_pubsub::Bus;
//!
//! #[derive(Debug, Clone)]
//! struct ChatMessage {
//!     user: String,
//!     body: String,
//! }
//!
//! let bus = Bus::<ChatMessage>::new();
//! let message = ChatMessage {
//!     user: "ada".to_string(),
//!     body: "shipping today".to_string(),
//! };
//!
//! // Publishing with no subscribers is a no-op
//! bus.publish(message, ["release", "ops"]);
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use platform_pubsub::Bus;
//! use std::thread;
//!
//! let bus = Bus::<String>::new();
//! let sub = bus.subscribe(["release", "ops"]);
//! let events = sub.receiver();
//!
//! let reader = thread::spawn(move || events.into_iter().collect::<Vec<_>>());
//!
//! bus.publish("deploy started".to_string(), ["release", "ops"]);
//! bus.publish("deploy finished".to_string(), ["release"]);
//! sub.unsubscribe();
//!
//! assert_eq!(reader.join().unwrap(), vec!["deploy started", "deploy finished"]);
//! ```
//!
//! ## Configuration
//!
//! Subscription channels hold [`DEFAULT_BUFFER_SIZE`] events unless configured
//! otherwise through [`BusConfig`]. A negative buffer size makes channels
//! unbuffered: each delivery waits for the subscriber to read it.

pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
mod registry;
pub mod subscription;
mod topic;

// Re-export main types
pub use bus::{Bus, BusStats, EventBus};
pub use channel::{IntoIter, Iter, Receiver};
pub use config::{BusConfig, DEFAULT_BUFFER_SIZE};
pub use error::{RecvError, RecvTimeoutError, TryRecvError};
pub use subscription::{Subscription, SubscriptionId, SubscriptionState};
