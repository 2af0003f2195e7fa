//! Import bundle helpers.
//!
//! A bundle is a directory with the main book file, included chapter files,
//! entity files and images. The import runs on a temporary working copy so
//! normalization never touches the input directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use url::Url;

use crate::error::BundleError;
use crate::normalize::is_xml_file;
use crate::tree::DocTree;

/// Find the main book file of a bundle.
///
/// Only `*.xml` files directly in `dir` are considered, in name order. The
/// main file is the first whose trimmed content contains `<book` and ends
/// with `</book>`.
pub fn find_main_book_file(dir: &Path) -> Result<PathBuf, BundleError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_xml_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let bytes = fs::read(&path)?;
        let content = String::from_utf8_lossy(&bytes);
        let content = content.trim();
        if content.contains("<book") && (content.ends_with("</book>") || content.ends_with("</ book>")) {
            debug!(path = %path.display(), "main book file");
            return Ok(path);
        }
    }
    Err(BundleError::NoMainFile(dir.to_path_buf()))
}

/// `file:` URL of an absolute path, the origin of a bundle document.
pub fn file_url(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

/// Check that every local media reference of the tree exists below `dir`.
///
/// Returns one message per missing file, in tree order.
pub fn validate_media(tree: &DocTree, dir: &Path) -> Vec<String> {
    let mut messages = Vec::new();
    for id in tree.pre_order() {
        for media_ref in tree.node(id).local_media_refs() {
            if !dir.join(media_ref).exists() {
                debug!("missing image file {media_ref}");
                messages.push(format!("Missing image file: {media_ref}"));
            }
        }
    }
    messages
}

/// Copy the bundle at `source` into a new temporary directory.
///
/// The directory is removed when the returned handle is dropped.
pub fn prepare_working_copy(source: &Path) -> Result<TempDir, BundleError> {
    let copy = tempfile::Builder::new().prefix("dbk-import-").tempdir()?;
    copy_dir(source, copy.path())?;
    debug!(from = %source.display(), to = %copy.path().display(), "working copy prepared");
    Ok(copy)
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), BundleError> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let target = to.join(entry.file_name());
        if path.is_dir() {
            fs::create_dir_all(&target)?;
            copy_dir(&path, &target)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}
