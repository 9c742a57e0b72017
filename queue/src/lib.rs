//! Durable, ordered, deduplicating buffer for blocks awaiting import.
//!
//! Network receivers push blocks as they arrive from peers; the import
//! pipeline drains them lowest number first. Contents survive restarts
//! through the transactional store, a block number is never queued twice,
//! and a block is never handed to two consumers.

pub mod errors;
pub mod queue;

pub use errors::{QueueError, QueueResult};
pub use queue::BlockQueue;
