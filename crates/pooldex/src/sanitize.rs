//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Logs and traces are safe to share for debugging; these functions keep
//! applicant identities and raw bundle names out of them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Shortens a remote display name for span fields.
///
/// Scanned bundles are often named after the applicant, so only a short
/// prefix of the stem is revealed alongside the extension.
pub fn redact_name(name: &str) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s, Some(e)),
        None => (name, None),
    };
    let mut shown: String = stem.chars().take(8).collect();
    if stem.chars().count() > 8 {
        shown.push_str("...");
    }
    match ext {
        Some(e) => format!("{}.{}", shown, e),
        None => shown,
    }
}

/// Masks an applicant id down to its last four digits.
pub fn mask_id(id: &str) -> String {
    let count = id.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = id.chars().skip(count - 4).collect();
    format!("...{}", tail)
}

/// Returns a short deterministic hash of a remote file id.
///
/// Used both for correlation in logs and as the opaque stem under which a
/// bundle's anonymised copy is published.
pub fn opaque_stem(file_id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    file_id.hash(&mut hasher);
    let hash = hasher.finish();
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_name_truncates_stem() {
        assert_eq!(redact_name("jane-bloggs-bundle.pdf"), "jane-blo....pdf");
    }

    #[test]
    fn test_redact_name_short_stem_unchanged() {
        assert_eq!(redact_name("scan.pdf"), "scan.pdf");
    }

    #[test]
    fn test_redact_name_no_extension() {
        assert_eq!(redact_name("bundle"), "bundle");
    }

    #[test]
    fn test_mask_id_keeps_last_four() {
        assert_eq!(mask_id("1484723695"), "...3695");
    }

    #[test]
    fn test_mask_id_short_ids_fully_masked() {
        assert_eq!(mask_id("123"), "****");
    }

    #[test]
    fn test_opaque_stem_deterministic() {
        let s1 = opaque_stem("drive-file-id-1");
        let s2 = opaque_stem("drive-file-id-1");
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 16);
    }

    #[test]
    fn test_opaque_stem_differs_per_id() {
        assert_ne!(opaque_stem("file-a"), opaque_stem("file-b"));
    }
}
