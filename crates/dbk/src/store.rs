//! Target store writing pages to a directory tree.
//!
//! Every page gets a directory named after its title below its parent's
//! directory:
//!
//! ```text
//! wiki/
//!   Cache Guide/
//!     Cache Guide.wiki
//!     labels
//!     Usage/
//!       Usage.wiki
//!       attachments/loader.png
//! ```

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dbk_docbook::{Attachment, PageDraft, StoreError, TargetStore};
use tracing::debug;

/// Extension of page body files.
const PAGE_EXTENSION: &str = "wiki";

/// Name of the per-page attachment directory.
const ATTACHMENTS_DIR: &str = "attachments";

/// Name of the per-page label file, one label per line.
const LABELS_FILE: &str = "labels";

/// [`TargetStore`] mirroring the page tree on disk.
pub(crate) struct DirectoryStore {
    root: PathBuf,
    titles: HashSet<String>,
}

impl DirectoryStore {
    /// Open the store at `root`, creating the directory if needed.
    ///
    /// Pages already present below `root` count as existing titles.
    pub(crate) fn open(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let mut titles = HashSet::new();
        collect_titles(root, &mut titles)?;
        debug!(root = %root.display(), pages = titles.len(), "Opened output directory");
        Ok(Self {
            root: root.to_path_buf(),
            titles,
        })
    }
}

fn collect_titles(dir: &Path, titles: &mut HashSet<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_titles(&path, titles)?;
        } else if path.extension().is_some_and(|ext| ext == PAGE_EXTENSION)
            && let Some(stem) = path.file_stem()
        {
            titles.insert(stem.to_string_lossy().into_owned());
        }
    }
    Ok(())
}

impl TargetStore for DirectoryStore {
    type PageId = PathBuf;

    fn title_exists(&self, title: &str) -> Result<bool, StoreError> {
        Ok(self.titles.contains(title))
    }

    fn create_page(
        &mut self,
        parent: Option<&PathBuf>,
        page: &PageDraft,
    ) -> Result<PathBuf, StoreError> {
        let title = page.title.as_str();
        if title.is_empty() || title == "." || title == ".." || title.contains(['/', '\\']) {
            return Err(StoreError::Rejected(format!(
                "page title {title:?} cannot be used as a directory name"
            )));
        }
        if self.titles.contains(title) {
            return Err(StoreError::Rejected(format!("page {title:?} already exists")));
        }

        let dir = parent.unwrap_or(&self.root).join(title);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(format!("{title}.{PAGE_EXTENSION}")), &page.body)?;
        self.titles.insert(title.to_owned());
        Ok(dir)
    }

    fn add_attachment(&mut self, page: &PathBuf, attachment: &Attachment) -> Result<(), StoreError> {
        let dir = page.join(ATTACHMENTS_DIR);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(&attachment.file_name), &attachment.data)?;
        Ok(())
    }

    fn add_label(&mut self, page: &PathBuf, label: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(page.join(LABELS_FILE))?;
        writeln!(file, "{label}")?;
        Ok(())
    }
}
