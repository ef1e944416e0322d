use uuid::Uuid;

/// Distinguishes a loop-provided base model id from a pretrained starting-point name.
///
/// Only version-4 UUIDs count, so a pretrained model named e.g. `"tiny"` (or even a v1/v5
/// UUID-shaped string) is never mistaken for a loop model id.
pub fn is_valid_uuid4(s: &str) -> bool {
    match Uuid::parse_str(s) {
        Ok(uuid) => uuid.get_version_num() == 4,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_v4_uuid() {
        let id = Uuid::new_v4().to_string();
        assert!(is_valid_uuid4(&id));
    }

    #[test]
    fn rejects_pretrained_name() {
        assert!(!is_valid_uuid4("tiny"));
    }

    #[test]
    fn rejects_non_v4_uuid() {
        // a nil uuid parses fine but isn't version 4
        assert!(!is_valid_uuid4("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(!is_valid_uuid4("not-a-uuid-at-all"));
    }
}
