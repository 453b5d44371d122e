//! Archive safety: entry ceilings and path traversal guards.

use std::path::{Component, Path};

use crate::error::SecurityError;

/// Hard cap on the number of entries in a parsed archive. These ceilings
/// are anti-zip-bomb guards, not user preferences, so they are constants
/// rather than options.
pub const MAX_ARCHIVE_ENTRIES: u64 = 10_000;

/// Hard cap on the total uncompressed size across all archive entries.
pub const MAX_ARCHIVE_BYTES: u64 = 1_000_000_000;

/// Check a ZIP entry path for traversal attacks. Rejects absolute paths,
/// Windows drive prefixes, and any `..` component.
pub fn check_path_traversal(entry_path: &str) -> Result<(), SecurityError> {
    if entry_path.starts_with('/') || entry_path.starts_with('\\') {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    for component in Path::new(entry_path).components() {
        if let Component::ParentDir = component {
            return Err(SecurityError::PathTraversal {
                path: entry_path.to_string(),
            });
        }
    }

    Ok(())
}

/// Check the entry count against [`MAX_ARCHIVE_ENTRIES`].
pub fn check_entry_count(count: u64) -> Result<(), SecurityError> {
    if count > MAX_ARCHIVE_ENTRIES {
        return Err(SecurityError::TooManyEntries {
            count,
            limit: MAX_ARCHIVE_ENTRIES,
        });
    }
    Ok(())
}

/// Check the total uncompressed size against [`MAX_ARCHIVE_BYTES`].
pub fn check_total_size(total_bytes: u64) -> Result<(), SecurityError> {
    if total_bytes > MAX_ARCHIVE_BYTES {
        return Err(SecurityError::ArchiveTooLarge {
            bytes: total_bytes,
            limit: MAX_ARCHIVE_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_paths_pass() {
        assert!(check_path_traversal("EPUB/text/chapter-1.xhtml").is_ok());
        assert!(check_path_traversal("META-INF/container.xml").is_ok());
        assert!(check_path_traversal("mimetype").is_ok());
        assert!(check_path_traversal("EPUB/images/cover.jpg").is_ok());
    }

    #[test]
    fn traversal_paths_rejected() {
        assert!(check_path_traversal("../evil.txt").is_err());
        assert!(check_path_traversal("EPUB/../../etc/shadow").is_err());
        assert!(check_path_traversal("/etc/passwd").is_err());
        assert!(check_path_traversal("\\Windows\\System32\\config").is_err());
        assert!(check_path_traversal("C:\\Windows\\System32").is_err());
    }

    #[test]
    fn entry_count_ceiling() {
        assert!(check_entry_count(100).is_ok());
        assert!(check_entry_count(MAX_ARCHIVE_ENTRIES).is_ok());
        assert!(check_entry_count(MAX_ARCHIVE_ENTRIES + 1).is_err());
    }

    #[test]
    fn total_size_ceiling() {
        assert!(check_total_size(1024).is_ok());
        assert!(check_total_size(MAX_ARCHIVE_BYTES).is_ok());
        assert!(check_total_size(MAX_ARCHIVE_BYTES + 1).is_err());
    }
}
