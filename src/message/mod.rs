//! Messages and the boxes that hold them
//!
//! - Message: immutable data + metadata envelope
//! - Inbox: per-sheet queue that never drops its last message
//! - Outbox: machine-wide keyed store

mod envelope;
mod inbox;
mod outbox;

pub use envelope::{Message, Metadata};
pub use inbox::Inbox;
pub use outbox::Outbox;
