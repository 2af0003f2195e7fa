//! Import pipeline.
//!
//! An import runs in two phases. [`Importer::prepare`] copies the bundle to
//! a working directory, parses the book structure, validates local media,
//! assigns unique page titles, normalizes the sources and renders every
//! node into a [`PageUnit`]. [`publish`] then hands the units to
//! a [`TargetStore`], parents before children.
//!
//! Nothing is written to the store until every page has been rendered, so
//! a broken chapter fails the run before the first page exists.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use url::Url;

use crate::bundle::{file_url, find_main_book_file, prepare_working_copy, validate_media};
use crate::dialect::Dialect;
use crate::error::{BundleError, ImportError, StoreError};
use crate::normalize::normalize_dir;
use crate::patch::patch_references;
use crate::resolver::EntityResolver;
use crate::structure::{StructureOptions, parse_structure};
use crate::titles::assign_unique_titles;
use crate::transform::transform_node;
use crate::tree::{DocTree, NodeId, filename_from_local_ref};
use crate::xml::LoadOptions;

/// Destination of imported pages.
pub trait TargetStore {
    /// Handle of a created page.
    type PageId: Clone;

    /// Whether a page with `title` already exists.
    fn title_exists(&self, title: &str) -> Result<bool, StoreError>;

    /// Create a page below `parent`, or at the top level when `parent` is
    /// `None`.
    fn create_page(
        &mut self,
        parent: Option<&Self::PageId>,
        page: &PageDraft,
    ) -> Result<Self::PageId, StoreError>;

    /// Attach a file to a page.
    fn add_attachment(&mut self, page: &Self::PageId, attachment: &Attachment)
    -> Result<(), StoreError>;

    /// Add a label to a page.
    fn add_label(&mut self, page: &Self::PageId, label: &str) -> Result<(), StoreError>;
}

/// Page content handed to [`TargetStore::create_page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDraft {
    /// Unique page title.
    pub title: String,
    /// Wiki markup body.
    pub body: String,
    /// Position among the siblings, starting at 0.
    pub position: usize,
}

/// File attached to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment name, the last segment of the media reference.
    pub file_name: String,
    /// MIME type guessed from the file extension.
    pub content_type: &'static str,
    /// File content.
    pub data: Vec<u8>,
}

/// A rendered page waiting to be published.
#[derive(Debug, Clone)]
pub struct PageUnit {
    /// Title, body and position.
    pub draft: PageDraft,
    /// Index of the parent unit in [`ImportPlan::pages`], `None` for the
    /// book page.
    pub parent: Option<usize>,
    /// Attachments, one per distinct local media reference.
    pub attachments: Vec<Attachment>,
    /// Labels assigned after the page is created.
    pub labels: Vec<String>,
}

/// Result of [`Importer::prepare`].
#[derive(Debug)]
pub struct ImportPlan {
    /// Main book file name inside the bundle.
    pub main_file: PathBuf,
    /// Book structure with assigned title prefixes.
    pub tree: DocTree,
    /// Pages in pre-order; every parent precedes its children.
    pub pages: Vec<PageUnit>,
}

/// Counts of what [`publish`] wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    /// Pages created.
    pub pages: usize,
    /// Attachments uploaded.
    pub attachments: usize,
    /// Labels assigned.
    pub labels: usize,
}

/// Import settings.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Source dialect.
    pub dialect: Dialect,
    /// Base for disambiguating title prefixes.
    pub title_prefix_base: Option<String>,
    /// Turn every nested section into its own page.
    pub all_section_levels: bool,
    /// Document loading options.
    pub load: LoadOptions,
    /// Labels added to every page.
    pub labels: Vec<String>,
}

/// Imports DocBook bundles into a [`TargetStore`].
pub struct Importer<'a> {
    options: ImportOptions,
    resolver: &'a dyn EntityResolver,
}

impl<'a> Importer<'a> {
    /// Create an importer resolving external references through `resolver`.
    pub fn new(options: ImportOptions, resolver: &'a dyn EntityResolver) -> Self {
        Self { options, resolver }
    }

    /// Import the bundle in `source` below `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] when preparing or publishing fails.
    pub fn run<S: TargetStore>(
        &self,
        source: &Path,
        store: &mut S,
        parent: Option<&S::PageId>,
    ) -> Result<ImportReport, ImportError> {
        let plan = self.prepare(source, &*store)?;
        publish(&plan, store, parent)
    }

    /// Render every page of the bundle in `source`.
    ///
    /// `store` is only asked whether titles exist. The bundle directory is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::MissingMedia`] when local media files are
    /// missing, and the underlying error when the bundle, structure, titles
    /// or a node's content cannot be processed.
    pub fn prepare<S: TargetStore + ?Sized>(
        &self,
        source: &Path,
        store: &S,
    ) -> Result<ImportPlan, ImportError> {
        let workdir = prepare_working_copy(source)?;
        let main = find_main_book_file(workdir.path())?;
        let origin = file_url(&main).ok_or_else(|| ImportError::InvalidSource(main.clone()))?;
        info!(file = %main.display(), dialect = %self.options.dialect, "Importing book");

        let structure = StructureOptions {
            all_section_levels: self.options.all_section_levels,
            load: self.options.load.clone(),
        };
        let bytes = fs::read(&main).map_err(BundleError::from)?;
        let mut tree = parse_structure(&bytes, &origin, self.options.dialect, &structure, self.resolver)?;

        let missing = validate_media(&tree, workdir.path());
        if !missing.is_empty() {
            return Err(ImportError::MissingMedia(missing));
        }

        assign_unique_titles(
            &mut tree,
            self.options.title_prefix_base.as_deref(),
            |title| store.title_exists(title),
        )?;

        let normalized = normalize_dir(workdir.path()).map_err(BundleError::from)?;
        debug!(files = normalized, "Sources normalized");
        let bytes = fs::read(&main).map_err(BundleError::from)?;

        let order = tree.pre_order();
        let mut pages = Vec::with_capacity(order.len());
        for &id in &order {
            let unit = match tree.parent(id) {
                None => Self::book_unit(&tree, id)?,
                Some(parent) => PageUnit {
                    parent: order.iter().position(|&n| n == parent),
                    ..self.node_unit(&tree, id, &bytes, &origin, workdir.path())?
                },
            };
            pages.push(unit);
        }

        Ok(ImportPlan {
            main_file: main
                .strip_prefix(workdir.path())
                .map_or_else(|_| main.clone(), Path::to_path_buf),
            tree,
            pages,
        })
    }

    /// The book page carries no content, attachments or labels of its own.
    fn book_unit(tree: &DocTree, id: NodeId) -> Result<PageUnit, ImportError> {
        Ok(PageUnit {
            draft: PageDraft {
                title: page_title(tree, id)?,
                body: String::new(),
                position: 0,
            },
            parent: None,
            attachments: Vec::new(),
            labels: Vec::new(),
        })
    }

    fn node_unit(
        &self,
        tree: &DocTree,
        id: NodeId,
        source: &[u8],
        origin: &Url,
        workdir: &Path,
    ) -> Result<PageUnit, ImportError> {
        let title = page_title(tree, id)?;
        debug!(node = %tree.describe(id), title = %title, "Rendering page");

        let markup = transform_node(
            source,
            origin,
            tree,
            id,
            self.options.dialect,
            &self.options.load,
            self.resolver,
        )?;
        let body = patch_references(&markup, tree, id);

        let position = tree
            .parent(id)
            .and_then(|parent| tree.children(parent).iter().position(|&c| c == id))
            .unwrap_or_default();

        Ok(PageUnit {
            draft: PageDraft { title, body, position },
            parent: None,
            attachments: attachments(tree, id, workdir)?,
            labels: self.labels(tree, id),
        })
    }

    fn labels(&self, tree: &DocTree, id: NodeId) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let global = self
            .options
            .labels
            .iter()
            .map(String::as_str)
            .map(str::trim)
            .filter(|l| !l.is_empty());
        for label in tree.node(id).labels().iter().map(String::as_str).chain(global) {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_owned());
            }
        }
        labels
    }
}

/// Create the pages of `plan` in `store` below `parent`.
///
/// Each page is created with its attachments, then labelled.
///
/// # Errors
///
/// Returns [`ImportError::Store`] on the first store failure. Pages created
/// before the failure are left in the store.
pub fn publish<S: TargetStore>(
    plan: &ImportPlan,
    store: &mut S,
    parent: Option<&S::PageId>,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();
    let mut created: Vec<S::PageId> = Vec::with_capacity(plan.pages.len());

    for unit in &plan.pages {
        let page_parent = match unit.parent {
            Some(index) => created.get(index),
            None => parent,
        };
        let page = store.create_page(page_parent, &unit.draft)?;
        info!(title = %unit.draft.title, "Created page");
        report.pages += 1;

        for attachment in &unit.attachments {
            store.add_attachment(&page, attachment)?;
            report.attachments += 1;
        }
        for label in &unit.labels {
            store.add_label(&page, label)?;
            report.labels += 1;
        }
        created.push(page);
    }
    Ok(report)
}

fn page_title(tree: &DocTree, id: NodeId) -> Result<String, ImportError> {
    tree.node(id)
        .target_title()
        .ok_or_else(|| ImportError::MissingTitle(tree.describe(id)))
}

fn attachments(tree: &DocTree, id: NodeId, workdir: &Path) -> Result<Vec<Attachment>, ImportError> {
    let mut seen = HashSet::new();
    let mut attachments = Vec::new();
    for media_ref in tree.node(id).local_media_refs() {
        if !seen.insert(media_ref.as_str()) {
            continue;
        }
        let Some(file_name) = filename_from_local_ref(media_ref) else {
            continue;
        };
        let data = fs::read(workdir.join(media_ref)).map_err(BundleError::from)?;
        attachments.push(Attachment {
            file_name: file_name.to_owned(),
            content_type: guess_content_type(file_name),
            data,
        });
    }
    Ok(attachments)
}

/// MIME type for an attachment file name.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// [`TargetStore`] keeping pages in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Titles reported as existing before the import.
    pub existing: HashSet<String>,
    /// Created pages, indexed by page id.
    pub pages: Vec<StoredPage>,
}

/// Page recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    /// Parent page index.
    pub parent: Option<usize>,
    /// Page content.
    pub draft: PageDraft,
    /// Attachment file names.
    pub attachments: Vec<String>,
    /// Labels.
    pub labels: Vec<String>,
}

impl MemoryStore {
    /// Page with `title`, if created.
    pub fn page(&self, title: &str) -> Option<&StoredPage> {
        self.pages.iter().find(|p| p.draft.title == title)
    }

    fn stored(&mut self, page: usize) -> Result<&mut StoredPage, StoreError> {
        self.pages
            .get_mut(page)
            .ok_or_else(|| StoreError::Rejected(format!("unknown page {page}")))
    }
}

impl TargetStore for MemoryStore {
    type PageId = usize;

    fn title_exists(&self, title: &str) -> Result<bool, StoreError> {
        Ok(self.existing.contains(title) || self.page(title).is_some())
    }

    fn create_page(&mut self, parent: Option<&usize>, page: &PageDraft) -> Result<usize, StoreError> {
        if self.title_exists(&page.title)? {
            return Err(StoreError::Rejected(format!("page {:?} already exists", page.title)));
        }
        self.pages.push(StoredPage {
            parent: parent.copied(),
            draft: page.clone(),
            attachments: Vec::new(),
            labels: Vec::new(),
        });
        Ok(self.pages.len() - 1)
    }

    fn add_attachment(&mut self, page: &usize, attachment: &Attachment) -> Result<(), StoreError> {
        self.stored(*page)?.attachments.push(attachment.file_name.clone());
        Ok(())
    }

    fn add_label(&mut self, page: &usize, label: &str) -> Result<(), StoreError> {
        self.stored(*page)?.labels.push(label.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dbk_cache::ResourceCache;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::error::TitleError;
    use crate::resolver::{CachingResolver, FileResolver};

    const BOOK: &str = r#"<?xml version="1.0"?>
<book xmlns="http://docbook.org/ns/docbook" xmlns:xi="http://www.w3.org/2001/XInclude">
  <info><title>Cache Guide</title></info>
  <xi:include href="intro.xml"/>
  <chapter xml:id="ch2">
    <info>
      <title>Usage</title>
      <keywordset><keyword>Getting Started</keyword></keywordset>
    </info>
    <para>
       See <link linkend="intro">the introduction</link>.
    </para>
    <section xml:id="s21">
      <title>Loading</title>
      <para>Loaded by <xref linkend="s22"/>.</para>
      <figure><title>Loader</title>
        <mediaobject><imageobject><imagedata fileref="images/loader.png"/></imageobject></mediaobject>
      </figure>
      <mediaobject><imageobject><imagedata fileref="images/loader.png"/></imageobject></mediaobject>
    </section>
    <section xml:id="s22">
      <title>Eviction</title>
      <para>Least recently used.</para>
    </section>
  </chapter>
</book>
"#;

    const INTRO: &str = r#"<chapter xmlns="http://docbook.org/ns/docbook" xml:id="intro">
  <title>Introduction</title>
  <para>Hello.</para>
</chapter>
"#;

    fn bundle() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cache_Guide.xml"), BOOK).unwrap();
        fs::write(dir.path().join("intro.xml"), INTRO).unwrap();
        fs::create_dir(dir.path().join("images")).unwrap();
        fs::write(dir.path().join("images/loader.png"), b"\x89PNG").unwrap();
        dir
    }

    fn resolver() -> CachingResolver {
        CachingResolver::new(Arc::new(ResourceCache::default())).with_fallback(Box::new(FileResolver))
    }

    fn options() -> ImportOptions {
        ImportOptions {
            dialect: Dialect::DocBook50,
            title_prefix_base: Some("CG".to_owned()),
            labels: vec!["imported".to_owned()],
            ..ImportOptions::default()
        }
    }

    #[test]
    fn test_import_bundle() {
        let dir = bundle();
        let resolver = resolver();
        let importer = Importer::new(options(), &resolver);
        let mut store = MemoryStore::default();
        store.existing.insert("Introduction".to_owned());

        let report = importer.run(dir.path(), &mut store, None).unwrap();
        assert_eq!(
            report,
            ImportReport {
                pages: 5,
                attachments: 1,
                labels: 5,
            }
        );

        let titles: Vec<&str> = store.pages.iter().map(|p| p.draft.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Cache Guide", "CG-Introduction", "Usage", "Loading", "Eviction"]
        );

        let book = &store.pages[0];
        assert_eq!(book.parent, None);
        assert_eq!(book.draft.body, "");
        assert!(book.labels.is_empty());
        assert!(book.attachments.is_empty());

        let intro = store.page("CG-Introduction").unwrap();
        assert_eq!(intro.parent, Some(0));
        assert_eq!(intro.draft.position, 0);
        assert_eq!(intro.draft.body, "Hello.\n\n");

        let usage = store.page("Usage").unwrap();
        assert_eq!(usage.draft.position, 1);
        assert_eq!(
            usage.draft.body,
            "See [the introduction|CG-Introduction].\n\n"
        );
        assert_eq!(usage.labels, vec!["getting-started", "imported"]);

        let loading = store.page("Loading").unwrap();
        assert_eq!(loading.parent, Some(2));
        assert_eq!(loading.attachments, vec!["loader.png"]);
        assert!(loading.draft.body.starts_with("Loaded by [Eviction].\n\n"));
        assert!(loading.draft.body.contains("!loader.png|title=Loader!"));
        assert!(!loading.draft.body.contains("images/"));

        let eviction = store.page("Eviction").unwrap();
        assert_eq!(eviction.draft.position, 1);
        assert_eq!(eviction.draft.body, "Least recently used.\n\n");
    }

    #[test]
    fn test_import_leaves_bundle_untouched() {
        let dir = bundle();
        let resolver = resolver();
        let importer = Importer::new(options(), &resolver);

        let plan = importer.prepare(dir.path(), &MemoryStore::default()).unwrap();
        assert_eq!(plan.main_file, PathBuf::from("Cache_Guide.xml"));
        assert_eq!(plan.pages.len(), 5);
        assert_eq!(
            fs::read_to_string(dir.path().join("Cache_Guide.xml")).unwrap(),
            BOOK
        );
    }

    #[test]
    fn test_missing_media_stops_import() {
        let dir = bundle();
        fs::remove_file(dir.path().join("images/loader.png")).unwrap();
        let resolver = resolver();
        let importer = Importer::new(options(), &resolver);
        let mut store = MemoryStore::default();

        let err = importer.run(dir.path(), &mut store, None).unwrap_err();
        let ImportError::MissingMedia(messages) = err else {
            panic!("expected missing media");
        };
        assert_eq!(messages, vec!["Missing image file: images/loader.png".to_owned()]);
        assert!(store.pages.is_empty());
    }

    #[test]
    fn test_title_collision_without_prefix_base() {
        let dir = bundle();
        let resolver = resolver();
        let importer = Importer::new(
            ImportOptions {
                title_prefix_base: None,
                ..options()
            },
            &resolver,
        );
        let mut store = MemoryStore::default();
        store.existing.insert("Usage".to_owned());

        let err = importer.run(dir.path(), &mut store, None).unwrap_err();
        assert!(matches!(err, ImportError::Title(TitleError::PrefixBaseMissing)));
        assert!(store.pages.is_empty());
    }

    #[test]
    fn test_publish_below_parent() {
        let dir = bundle();
        let resolver = resolver();
        let importer = Importer::new(options(), &resolver);
        let mut store = MemoryStore::default();
        let parent = store
            .create_page(
                None,
                &PageDraft {
                    title: "Docs".to_owned(),
                    body: String::new(),
                    position: 0,
                },
            )
            .unwrap();

        importer.run(dir.path(), &mut store, Some(&parent)).unwrap();
        assert_eq!(store.page("Cache Guide").unwrap().parent, Some(parent));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("loader.png"), "image/png");
        assert_eq!(guess_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("diagram.svg"), "image/svg+xml");
        assert_eq!(guess_content_type("README"), "application/octet-stream");
    }
}
