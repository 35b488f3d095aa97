//! Position inside the current message's iterable payload

use serde::{Deserialize, Serialize};

/// Loop mode settings of a StreamSheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub enabled: bool,
    /// JSON pointer to the iterable inside the message data; empty = root
    pub path: String,
}

impl LoopSettings {
    pub fn over(path: &str) -> Self {
        Self {
            enabled: true,
            path: path.to_string(),
        }
    }
}

/// Loop position, valid in `[0, length - 1]` while active
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopCursor {
    index: usize,
    length: usize,
    message_id: Option<String>,
}

impl LoopCursor {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_active(&self) -> bool {
        self.message_id.is_some()
    }

    /// Move to the next element. A different message restarts at 0. The
    /// cursor never wraps; the last element is held until reset.
    pub fn advance(&mut self, message_id: &str, length: usize) -> Option<usize> {
        if length == 0 {
            self.reset();
            return None;
        }
        if self.message_id.as_deref() == Some(message_id) {
            if self.index + 1 < self.length {
                self.index += 1;
            }
        } else {
            self.message_id = Some(message_id.to_string());
            self.length = length;
            self.index = 0;
        }
        Some(self.index)
    }

    /// On the final element of the current message
    pub fn is_last(&self) -> bool {
        self.is_active() && self.index + 1 >= self.length
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_through_message() {
        let mut cursor = LoopCursor::default();
        assert_eq!(cursor.advance("m1", 3), Some(0));
        assert!(!cursor.is_last());
        assert_eq!(cursor.advance("m1", 3), Some(1));
        assert_eq!(cursor.advance("m1", 3), Some(2));
        assert!(cursor.is_last());
        // no wrap
        assert_eq!(cursor.advance("m1", 3), Some(2));
    }

    #[test]
    fn test_new_message_restarts() {
        let mut cursor = LoopCursor::default();
        cursor.advance("m1", 3);
        cursor.advance("m1", 3);
        assert_eq!(cursor.advance("m2", 2), Some(0));
        assert_eq!(cursor.length(), 2);
    }

    #[test]
    fn test_empty_payload_is_inactive() {
        let mut cursor = LoopCursor::default();
        cursor.advance("m1", 2);
        assert_eq!(cursor.advance("m2", 0), None);
        assert!(!cursor.is_active());
        assert!(!cursor.is_last());
    }

    #[test]
    fn test_reset() {
        let mut cursor = LoopCursor::default();
        cursor.advance("m1", 2);
        cursor.reset();
        assert_eq!(cursor.advance("m1", 2), Some(0));
    }
}
