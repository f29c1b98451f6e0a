//! Content-hash identity for idempotent writes

use sha2::{Digest, Sha256};

/// Hash of (normalized text + sorted table set).
///
/// Whitespace runs collapse to single spaces and the text is lowercased,
/// so formatting differences do not defeat idempotency. Table names are
/// sorted and lowercased for the same reason.
pub fn content_hash(text: &str, tables: &[String]) -> String {
    let normalized: Vec<&str> = text.split_whitespace().collect();
    let mut sorted_tables: Vec<String> = tables.iter().map(|t| t.to_lowercase()).collect();
    sorted_tables.sort();

    let mut hasher = Sha256::new();
    hasher.update(normalized.join(" ").to_lowercase().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(sorted_tables.join("\x1f").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_do_not_change_identity() {
        let a = content_hash("SELECT  name\nFROM drivers", &["drivers".into()]);
        let b = content_hash("select name from drivers", &["Drivers".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn table_order_does_not_change_identity() {
        let a = content_hash("q", &["results".into(), "drivers".into()]);
        let b = content_hash("q", &["drivers".into(), "results".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_tables_change_identity() {
        let a = content_hash("q", &["drivers".into()]);
        let b = content_hash("q", &["results".into()]);
        assert_ne!(a, b);
    }
}
