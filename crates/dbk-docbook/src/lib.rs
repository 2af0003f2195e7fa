//! DocBook to Confluence wiki markup conversion.
//!
//! Turns a DocBook book into a tree of wiki pages, one per book, chapter,
//! appendix and section:
//!
//! 1. [`parse_structure`] extracts the [`DocTree`] of the book.
//! 2. [`assign_unique_titles`] makes every page title unique in the target.
//! 3. [`transform_node`] renders the content of one node as wiki markup,
//!    without the content of its child nodes.
//! 4. [`patch_references`] rewrites media paths to attachment names and
//!    links to page titles.
//!
//! [`Importer`] runs the whole pipeline over a bundle directory and hands
//! the finished pages to a [`TargetStore`].
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use dbk_cache::ResourceCache;
//! use dbk_docbook::{CachingResolver, FileResolver, ImportOptions, Importer, MemoryStore};
//!
//! let resolver = CachingResolver::new(Arc::new(ResourceCache::default()))
//!     .with_fallback(Box::new(FileResolver));
//! let importer = Importer::new(ImportOptions::default(), &resolver);
//! let mut store = MemoryStore::default();
//! let report = importer.run(Path::new("docs/Cache_Guide"), &mut store, None)?;
//! println!("{} pages imported", report.pages);
//! ```

mod bundle;
mod dialect;
mod error;
pub mod escape;
mod importer;
mod normalize;
mod patch;
mod program;
mod resolver;
mod structure;
mod titles;
mod transform;
mod tree;
mod worker;
pub mod xml;

pub use bundle::{file_url, find_main_book_file, prepare_working_copy, validate_media};
pub use dialect::{Dialect, UnknownDialect};
pub use error::{
    BundleError, ImportError, ProgramError, ResolveError, StoreError, StructureError,
    TitleError, TransformError, TreeError, XmlError, error_chain,
};
pub use importer::{
    Attachment, ImportOptions, ImportPlan, ImportReport, Importer, MemoryStore, PageDraft,
    PageUnit, StoredPage, TargetStore, guess_content_type, publish,
};
pub use normalize::{normalize_content, normalize_dir, normalize_file};
pub use patch::patch_references;
pub use resolver::{
    CachingResolver, DEFAULT_FETCH_TIMEOUT, EntityResolver, Fetch, FileResolver, HttpFetcher,
};
pub use structure::{StructureOptions, normalize_label, parse_structure};
pub use titles::{assign_unique_titles, normalize_title};
pub use transform::transform_node;
pub use tree::{
    DocTree, NodeId, NodeOutline, NodeType, StructureNode, UnknownNodeType, filename_from_local_ref,
    is_external_ref,
};
