//! File-based cache implementation.
//!
//! [`FileCache`] stores cache entries as files on disk, organized into buckets
//! (subdirectories). Each entry is a single file holding the raw bytes. The
//! file name is the key with every character outside `[A-Za-z0-9_]` replaced
//! by `_` (see [`safe_key`]), so an URL maps to a flat, portable name:
//!
//! ```text
//! http://www.oasis-open.org/docbook/xml/4.5/docbookx.dtd
//!   -> http___www_oasis_open_org_docbook_xml_4_5_docbookx_dtd
//! ```
//!
//! Entries never expire. Writes go to a temporary sibling first and are
//! renamed into place, so a reader never sees a half-written entry.

use std::fs;
use std::path::PathBuf;

use crate::{Cache, CacheBucket};

/// File-based [`Cache`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- external/                 # bucket "external"
///     +-- http___example_com_a  # cache entry
/// ```
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a file-based cache at `root`.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join(name),
        })
    }
}

/// A single bucket backed by a directory on disk.
struct FileCacheBucket {
    dir: PathBuf,
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.dir.join(safe_key(key))).ok()
    }

    fn set(&self, key: &str, value: &[u8]) {
        let name = safe_key(key);
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::warn!("failed to create cache directory {}: {e}", self.dir.display());
            return;
        }

        let tmp = self.dir.join(format!(".{name}.tmp"));
        let result = fs::write(&tmp, value).and_then(|()| fs::rename(&tmp, self.dir.join(&name)));
        if let Err(e) = result {
            tracing::warn!("failed to write cache entry {name}: {e}");
            let _ = fs::remove_file(&tmp);
        }
    }
}

/// Map a cache key to a filesystem-safe file name.
///
/// Every character that is not an ASCII letter, digit or underscore becomes
/// `_`. The mapping is not injective; `a.b` and `a/b` share an entry.
#[must_use]
pub fn safe_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_safe_key_replaces_non_word_characters() {
        assert_eq!(
            safe_key("http://www.oasis-open.org/docbook/xml/4.5/docbookx.dtd"),
            "http___www_oasis_open_org_docbook_xml_4_5_docbookx_dtd"
        );
        assert_eq!(safe_key("already_safe_123"), "already_safe_123");
        assert_eq!(safe_key("žluť"), "_lu_");
    }

    #[test]
    fn test_file_bucket_set_and_get() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"));
        let bucket = cache.bucket("external");

        bucket.set("http://example.com/a.dtd", b"<!ENTITY a 'b'>");
        assert_eq!(
            bucket.get("http://example.com/a.dtd"),
            Some(b"<!ENTITY a 'b'>".to_vec())
        );
    }

    #[test]
    fn test_file_bucket_uses_safe_file_name() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().to_path_buf());
        let bucket = cache.bucket("external");

        bucket.set("http://example.com/a.dtd", b"data");

        let path = tmp.path().join("external/http___example_com_a_dtd");
        assert_eq!(fs::read(path).unwrap(), b"data");
    }

    #[test]
    fn test_file_bucket_get_nonexistent_key() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"));
        let bucket = cache.bucket("external");

        assert_eq!(bucket.get("http://example.com/missing"), None);
    }

    #[test]
    fn test_file_bucket_overwrite() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"));
        let bucket = cache.bucket("external");

        bucket.set("key", b"first");
        bucket.set("key", b"second");

        assert_eq!(bucket.get("key"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_file_cache_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        FileCache::new(root.clone())
            .bucket("external")
            .set("http://example.com/x", b"persisted");

        let reopened = FileCache::new(root).bucket("external");
        assert_eq!(
            reopened.get("http://example.com/x"),
            Some(b"persisted".to_vec())
        );
    }

    #[test]
    fn test_file_bucket_binary_data() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"));
        let bucket = cache.bucket("external");

        let binary_data: Vec<u8> = vec![0x00, 0x01, 0x0A, 0x0D, 0xFF, 0xFE, 0x80, 0x7F];
        bucket.set("binary", &binary_data);
        assert_eq!(bucket.get("binary"), Some(binary_data));
    }

    #[test]
    fn test_file_bucket_leaves_no_temporary_files() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().to_path_buf());
        cache.bucket("external").set("k", b"v");

        let names: Vec<_> = fs::read_dir(tmp.path().join("external"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["k".to_owned()]);
    }
}
