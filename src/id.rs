//! ID generation utilities
//!
//! Provides functions for generating unique identifiers for messages,
//! streamsheets, machines and async requests.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn suffixed(prefix: &str) -> String {
    let random: u32 = rand::rng().random();
    format!("{}-{}-{:08x}", prefix, now_ms(), random)
}

/// Generate a message ID
///
/// Format: `msg-{timestamp_ms}-{random_hex}`
pub fn generate_message_id() -> String {
    suffixed("msg")
}

/// Generate a StreamSheet ID
///
/// Format: `ss-{timestamp_ms}-{random_hex}`
pub fn generate_sheet_id() -> String {
    suffixed("ss")
}

/// Generate a machine ID
pub fn generate_machine_id() -> String {
    suffixed("machine")
}

/// Generate an async request ID
///
/// Format: `req-{sequence}-{random_hex}`. The sequence keeps ids unique even
/// when several requests are created within the same millisecond.
pub fn generate_request_id(sequence: u64) -> String {
    let random: u16 = rand::rng().random();
    format!("req-{}-{:04x}", sequence, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        // 2020-01-01 in ms
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_message_id_format() {
        let id = generate_message_id();
        assert!(id.starts_with("msg-"));
        assert_eq!(id.split('-').count(), 3);
    }

    #[test]
    fn test_sheet_id_prefix() {
        assert!(generate_sheet_id().starts_with("ss-"));
        assert!(generate_machine_id().starts_with("machine-"));
    }

    #[test]
    fn test_request_ids_differ_by_sequence() {
        let a = generate_request_id(1);
        let b = generate_request_id(2);
        assert!(a.starts_with("req-1-"));
        assert!(b.starts_with("req-2-"));
        assert_ne!(a, b);
    }
}
