use rand::RngCore;

/// Generates a collision-resistant identifier for a new article.
///
/// The output follows the canonical 8-4-4-4-12 lowercase hex grouping with
/// the version nibble fixed to `4` and the variant nibble in `8..=b`, so ids
/// sort and display like UUIDs everywhere. Randomness comes from the
/// process-local generator: ids are not security tokens and must never be
/// treated as capabilities.
///
/// # Examples
///
/// ```
/// use daybook::util::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 36);
/// assert_eq!(id.as_bytes()[14], b'4');
/// ```
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);

    // Version and variant nibbles per RFC 4122 layout
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3],
        bytes[4],
        bytes[5],
        bytes[6],
        bytes[7],
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 36);

        let bytes = id.as_bytes();
        for idx in [8, 13, 18, 23] {
            assert_eq!(bytes[idx], b'-', "expected dash at {idx} in {id}");
        }
        assert_eq!(bytes[14], b'4', "version nibble in {id}");
        assert!(
            matches!(bytes[19], b'8' | b'9' | b'a' | b'b'),
            "variant nibble in {id}"
        );
        assert!(id
            .chars()
            .all(|c| c == '-' || c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_ids_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_id()), "duplicate id generated");
        }
    }
}
