//! Immutable message envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{generate_message_id, now_ms};

/// Descriptive data attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Human-readable label
    pub label: Option<String>,
    /// Producer-defined message type
    pub message_type: Option<String>,
    /// Creation time (Unix ms)
    pub arrival: u64,
}

/// One unit of data flowing through a sheet.
///
/// Fields are private: a message cannot change once it has been put into a
/// box. Builders consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    data: Value,
    metadata: Metadata,
}

impl Message {
    /// Create a message with a generated id
    pub fn new(data: Value) -> Self {
        Self {
            id: generate_message_id(),
            data,
            metadata: Metadata {
                arrival: now_ms(),
                ..Default::default()
            },
        }
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata.label = Some(label.into());
        self
    }

    /// Set the message type
    pub fn with_type(mut self, message_type: impl Into<String>) -> Self {
        self.metadata.message_type = Some(message_type.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The value loop mode iterates over. An empty path means the payload root.
    fn loop_target(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            Some(&self.data)
        } else {
            self.data.pointer(path)
        }
    }

    /// Number of loop elements at `path`; 0 when the target is not iterable
    pub fn loop_length(&self, path: &str) -> usize {
        match self.loop_target(path) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        }
    }

    /// Loop element at `index`. Objects yield their values in key order.
    pub fn loop_element(&self, path: &str, index: usize) -> Option<&Value> {
        match self.loop_target(path)? {
            Value::Array(items) => items.get(index),
            Value::Object(map) => map.values().nth(index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_builders() {
        let msg = Message::new(json!({"a": 1}))
            .with_id("m1")
            .with_label("orders")
            .with_type("json");
        assert_eq!(msg.id(), "m1");
        assert_eq!(msg.metadata().label.as_deref(), Some("orders"));
        assert_eq!(msg.metadata().message_type.as_deref(), Some("json"));
        assert!(msg.metadata().arrival > 0);
    }

    #[test]
    fn test_loop_over_root_array() {
        let msg = Message::new(json!([10, 20, 30]));
        assert_eq!(msg.loop_length(""), 3);
        assert_eq!(msg.loop_element("", 1), Some(&json!(20)));
        assert_eq!(msg.loop_element("", 3), None);
    }

    #[test]
    fn test_loop_over_pointer_path() {
        let msg = Message::new(json!({"items": [{"x": 1}, {"x": 2}]}));
        assert_eq!(msg.loop_length("/items"), 2);
        assert_eq!(msg.loop_element("/items", 0), Some(&json!({"x": 1})));
        assert_eq!(msg.loop_length("/missing"), 0);
    }

    #[test]
    fn test_loop_over_object_values() {
        let msg = Message::new(json!({"b": 2, "a": 1}));
        assert_eq!(msg.loop_length(""), 2);
        // serde_json maps are key-ordered
        assert_eq!(msg.loop_element("", 0), Some(&json!(1)));
    }

    #[test]
    fn test_scalar_is_not_iterable() {
        let msg = Message::new(json!(42));
        assert_eq!(msg.loop_length(""), 0);
        assert_eq!(msg.loop_element("", 0), None);
    }
}
