// SPDX-License-Identifier: MIT

//! Correlation-id generation for log lines that span components
//! (e.g. a single `smart_launch` call touching discovery, port selection,
//! and spawn).

use uuid::Uuid;

/// Returns a short id suitable for correlating log lines across components.
///
/// Not persisted anywhere; purely a tracing aid, the same role
/// `agent_id`-for-logging plays in the teacher's spawn path.
pub fn short_id() -> String {
    let full = Uuid::new_v4().simple().to_string();
    full[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_twelve_hex_chars() {
        let id = short_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_id_is_not_constant() {
        assert_ne!(short_id(), short_id());
    }
}
