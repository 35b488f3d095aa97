//! Per-sheet message queue
//!
//! The front message is the one the owning StreamSheet is working on. Once a
//! step finishes it is marked processed; it is only popped when a successor
//! exists, so the last message put is never dropped.

use std::collections::VecDeque;

use crate::error::{EngineError, Result};
use crate::message::Message;

/// Ordered, append-only message queue owned by one StreamSheet
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    messages: VecDeque<Message>,
    front_processed: bool,
    max_size: Option<usize>,
}

impl Inbox {
    /// Create an unbounded inbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inbox that keeps at most `max_size` messages
    pub fn with_max_size(max_size: Option<usize>) -> Self {
        Self {
            max_size: max_size.map(|m| m.max(1)),
            ..Self::default()
        }
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Append a message. Ids must be unique within the inbox.
    ///
    /// When the capacity is exceeded the oldest messages are discarded; the
    /// newest one always stays.
    pub fn put(&mut self, message: Message) -> Result<()> {
        if self.messages.iter().any(|m| m.id() == message.id()) {
            return Err(EngineError::DuplicateMessage(message.id().to_string()));
        }
        self.messages.push_back(message);
        if let Some(max) = self.max_size {
            while self.messages.len() > max {
                if let Some(dropped) = self.messages.pop_front() {
                    log::debug!("Inbox full, discarding message {}", dropped.id());
                }
                self.front_processed = false;
            }
        }
        Ok(())
    }

    /// Current message without consuming it
    pub fn peek(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// Pop the front message if another message exists to replace it
    pub fn pop(&mut self) -> Option<Message> {
        if self.messages.len() > 1 {
            self.front_processed = false;
            self.messages.pop_front()
        } else {
            None
        }
    }

    /// Select the message for the next step.
    ///
    /// A processed front message is popped only when a successor is already
    /// queued; the check and the pop happen together.
    pub fn select(&mut self) -> Option<&Message> {
        if self.front_processed && self.messages.len() > 1 {
            self.messages.pop_front();
            self.front_processed = false;
        }
        self.messages.front()
    }

    /// Mark the current message as fully consumed
    pub fn mark_processed(&mut self) {
        if !self.messages.is_empty() {
            self.front_processed = true;
        }
    }

    /// True if a message is waiting that no step has finished yet
    pub fn has_unprocessed(&self) -> bool {
        match self.messages.len() {
            0 => false,
            1 => !self.front_processed,
            _ => true,
        }
    }

    /// Whether the current message has been consumed
    pub fn is_front_processed(&self) -> bool {
        self.front_processed
    }

    pub fn size(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Look up a message by id
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    /// Ids of all queued messages, oldest first
    pub fn ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id().to_string()).collect()
    }
}
