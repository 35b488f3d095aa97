//! Machine-wide keyed message store

use std::collections::VecDeque;

use crate::message::Message;

/// Messages published by sheets, addressable by id
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    messages: VecDeque<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message, replacing any message with the same id in place
    pub fn put(&mut self, message: Message) {
        match self.messages.iter_mut().find(|m| m.id() == message.id()) {
            Some(slot) => *slot = message,
            None => self.messages.push_back(message),
        }
    }

    pub fn peek(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    /// Remove and return a message by id
    pub fn pop(&mut self, id: &str) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.id() == id)?;
        self.messages.remove(pos)
    }

    pub fn size(&self) -> usize {
        self.messages.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id().to_string()).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
