//! Collision-resistant stored-name generation.

use std::fmt::Write as _;

use rand_core::{OsRng, RngCore};

/// Marker appended after the extension of compressed objects. The stored
/// name alone records the compression decision.
pub const COMPRESSION_SUFFIX: &str = ".gz";

/// A freshly generated stored name.
#[derive(Debug, Clone)]
pub struct GeneratedName {
    /// Pre-extension identifier, `{filename}-{hex}`. Names the key-backup
    /// file when backups are enabled.
    pub id: String,
    /// Full on-disk name, `{id}.{extension}` plus the compression marker.
    pub stored: String,
}

/// Builds a stored name from the submitted filename and extension. The
/// 128-bit random suffix makes collisions implausible (~2^-128 per call), so
/// no existence check against storage is needed and concurrent uploads never
/// coordinate.
pub fn generate(filename: &str, extension: &str, compressed: bool) -> GeneratedName {
    let id = format!("{}-{}", sanitize(filename), random_hex(16));

    let mut stored = id.clone();
    if !extension.is_empty() {
        stored.push('.');
        stored.push_str(extension);
    }
    if compressed {
        stored.push_str(COMPRESSION_SUFFIX);
    }

    GeneratedName { id, stored }
}

/// Strips directory components and replaces non-portable characters. Client
/// filenames are untrusted and end up joined to the storage root.
fn sanitize(filename: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // An all-dots or empty name would vanish into the path.
    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Hex encoding of `n` bytes of OS randomness. Also used for the default
/// config secret.
pub fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(n * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_name_layout() {
        let name = generate("photo.png", "png", false);
        assert!(name.stored.starts_with("photo.png-"));
        assert!(name.stored.ends_with(".png"));
        assert!(!name.stored.ends_with(COMPRESSION_SUFFIX));
        assert_eq!(name.stored, format!("{}.png", name.id));
    }

    #[test]
    fn compression_marker_comes_last() {
        let name = generate("notes.txt", "txt", true);
        assert!(name.stored.ends_with(".txt.gz"));
    }

    #[test]
    fn suffix_is_128_bits_of_hex() {
        let name = generate("a.txt", "txt", false);
        let suffix = name.id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn names_are_unique() {
        let a = generate("same.txt", "txt", false);
        let b = generate("same.txt", "txt", false);
        assert_ne!(a.stored, b.stored);
    }

    #[test]
    fn directory_components_are_stripped() {
        let name = generate("../../etc/passwd", "txt", false);
        assert!(!name.stored.contains('/'));
        assert!(name.stored.starts_with("passwd-"));

        let windows = generate("C:\\evil\\sneaky.txt", "txt", false);
        assert!(!windows.stored.contains('\\'));
        assert!(windows.stored.starts_with("sneaky.txt-"));
    }

    #[test]
    fn degenerate_filenames_get_a_placeholder() {
        assert!(generate("", "txt", false).stored.starts_with("file-"));
        assert!(generate("..", "txt", false).stored.starts_with("file-"));
    }
}
