//! Canopy message relay.
//!
//! The relay carries per-deployment build output from an isolated build
//! worker back to observers. Two channel families exist per deployment:
//!
//! - `logs:<deployment-id>`: ordered raw text lines
//! - `status:<deployment-id>`: lifecycle transitions as JSON
//!
//! The relay is a streaming overlay, not a queue: nothing is persisted and
//! there is no replay. A subscriber attached after a message was published
//! has permanently missed it, which is why callers must subscribe *before*
//! launching the worker that publishes.
//!
//! Delivery is at-least-once; within a single channel, delivery order
//! matches publish order from a single publisher. No ordering is guaranteed
//! across channels.

#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;
pub mod valkey;

pub use error::RelayError;
pub use memory::MemoryRelay;
pub use traits::Relay;
pub use types::{ChannelKey, RelayMessage, StatusEvent, Subscription};
pub use valkey::ValkeyRelay;
