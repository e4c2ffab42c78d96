//! Document source: the scraped content directory on disk.
//!
//! The scraper writes one Markdown file per article into a flat directory.
//! This module lists those files, reads their bytes and extracts the
//! optional in-content change marker.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::sync::types::{DocumentKey, SyncError, SyncResult};

/// One content file from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Key derived from the file name.
    pub key: DocumentKey,
    /// Where the file was read from.
    pub path: PathBuf,
    /// Exact file bytes.
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Read a document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or has no file name.
    pub fn read(path: &Path) -> SyncResult<Self> {
        let key = DocumentKey::from_path(path).ok_or_else(|| {
            SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no file name in {}", path.display()),
            ))
        })?;
        let bytes = fs::read(path)?;
        Ok(Self {
            key,
            path: path.to_path_buf(),
            bytes,
        })
    }

    /// The document as text (invalid UTF-8 replaced).
    #[must_use]
    pub fn read_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// List every document with `extension` in `dir`, sorted by file name.
///
/// The listing is not recursive. Extension matching ignores ASCII case and
/// a leading dot in `extension`.
///
/// # Errors
///
/// Returns [`SyncError::SourceMissing`] if `dir` is not a directory, or an
/// IO error if a file cannot be read.
pub fn discover(dir: &Path, extension: &str) -> SyncResult<Vec<SourceDocument>> {
    if !dir.is_dir() {
        return Err(SyncError::SourceMissing(dir.to_path_buf()));
    }

    let extension = extension.trim_start_matches('.');
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let documents = paths
        .iter()
        .map(|p| SourceDocument::read(p))
        .collect::<SyncResult<Vec<_>>>()?;

    debug!(dir = %dir.display(), count = documents.len(), "Discovered documents");
    Ok(documents)
}

/// Extract the change marker from document text.
///
/// The marker is the remainder of the first line that starts with `prefix`
/// (after trimming). Returns `None` when no line matches or the remainder is
/// empty.
#[must_use]
pub fn extract_change_marker(text: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }

    text.lines()
        .find_map(|line| line.trim().strip_prefix(prefix))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("b.md"), "b").unwrap();
        fs::write(dir.join("a.md"), "a").unwrap();
        fs::write(dir.join("C.MD"), "c").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.join("nested.md")).unwrap();

        let docs = discover(dir, "md").unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.key.as_str()).collect();

        assert_eq!(names, vec!["C.MD", "a.md", "b.md"]);
        assert_eq!(docs[1].bytes, b"a");
    }

    #[test]
    fn test_discover_accepts_dotted_extension() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.md"), "a").unwrap();

        assert_eq!(discover(temp_dir.path(), ".md").unwrap().len(), 1);
    }

    #[test]
    fn test_discover_missing_dir() {
        let result = discover(Path::new("/nonexistent/articles"), "md");
        assert!(matches!(result, Err(SyncError::SourceMissing(_))));
    }

    #[test]
    fn test_read_text_lossy() {
        let doc = SourceDocument {
            key: "a.md".into(),
            path: PathBuf::from("a.md"),
            bytes: vec![b'o', b'k', 0xff],
        };
        assert!(doc.read_text().starts_with("ok"));
    }

    #[test]
    fn test_extract_change_marker() {
        let text = "Article URL: https://example.com\n\n  Last Modified: 2025-01-20  \nbody";
        assert_eq!(
            extract_change_marker(text, "Last Modified:"),
            Some("2025-01-20".to_string())
        );
    }

    #[test]
    fn test_extract_change_marker_first_match_wins() {
        let text = "Last Modified: one\nLast Modified: two\n";
        assert_eq!(extract_change_marker(text, "Last Modified:").as_deref(), Some("one"));
    }

    #[test]
    fn test_extract_change_marker_absent_or_empty() {
        assert_eq!(extract_change_marker("# Title\nbody\n", "Last Modified:"), None);
        assert_eq!(extract_change_marker("Last Modified:   \n", "Last Modified:"), None);
        assert_eq!(extract_change_marker("Last Modified: x", ""), None);
    }
}
