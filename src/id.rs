//! ID generation utilities
//!
//! Run ids sort by creation time; tool-call ids only need to be unique within a run.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique run ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2`
pub fn generate_run_id() -> String {
    let random: u16 = rand::rng().random();
    format!("{}-{:04x}", now_ms(), random)
}

/// Generate an id for a tool call the reasoner left unnamed
///
/// Format: `call-{random_hex}`
pub fn generate_tool_call_id() -> String {
    let random: u32 = rand::rng().random();
    format!("call-{:08x}", random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = generate_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_tool_call_id_format() {
        let id = generate_tool_call_id();
        assert!(id.starts_with("call-"));
        assert_eq!(id.len(), "call-".len() + 8);
    }

    #[test]
    fn test_generate_tool_call_id_uniqueness() {
        let ids: std::collections::HashSet<_> = (0..50).map(|_| generate_tool_call_id()).collect();
        assert!(ids.len() > 45);
    }
}
