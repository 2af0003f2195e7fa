//! Document structure parser.
//!
//! Produces the [`DocTree`] of a DocBook book: the dialect's structure
//! program flattens the document into intermediate XML on an isolated
//! worker, then the builder turns that into a tree which is validated.

mod builder;
mod extract;

pub use extract::normalize_label;

use tracing::{debug, error, warn};
use url::Url;

use self::builder::{MAX_STRUCTURE_DEPTH, build_tree};
use self::extract::extract;
use crate::dialect::Dialect;
use crate::error::StructureError;
use crate::program::{StructureProgram, instantiate, template};
use crate::resolver::EntityResolver;
use crate::tree::{DocTree, NodeType};
use crate::worker::run_isolated;
use crate::xml::{Diagnostics, LoadOptions, load_document};

/// Options for structure parsing.
#[derive(Debug, Clone, Default)]
pub struct StructureOptions {
    /// Turn every nested section into a node, not only the first two levels.
    pub all_section_levels: bool,
    /// Document loading options.
    pub load: LoadOptions,
}

/// Parse the structure of the book in `source`.
///
/// `origin` is the location of `source`; relative includes and entity files
/// are resolved against it through `resolver`.
///
/// # Errors
///
/// Returns [`StructureError`] when the document cannot be loaded, does not
/// match the dialect, or a chapter, appendix or section lacks a title or id.
pub fn parse_structure(
    source: &[u8],
    origin: &Url,
    dialect: Dialect,
    options: &StructureOptions,
    resolver: &dyn EntityResolver,
) -> Result<DocTree, StructureError> {
    let name = format!("structure{}", dialect.postfix());
    let recurse = if options.all_section_levels { "recurse" } else { "" };
    let text = instantiate(template(&name)?, &[recurse]);
    let program = StructureProgram::parse(&name, &text)?;

    let intermediate = run_isolated(|| -> Result<String, StructureError> {
        let mut diagnostics = Diagnostics::default();
        let root = load_document(source, origin, resolver, &options.load, &mut diagnostics);
        for warning in &diagnostics.warnings {
            warn!(%origin, "{warning}");
        }
        extract(&root?, &program)
    })
    .map_err(StructureError::Worker)??;
    debug!(%origin, "intermediate structure: {intermediate}");

    let max_depth = (!options.all_section_levels).then_some(MAX_STRUCTURE_DEPTH);
    let tree = build_tree(&intermediate, max_depth).inspect_err(|e| {
        error!("{e}; intermediate structure: {intermediate}");
    })?;
    validate(&tree, &intermediate)?;
    Ok(tree)
}

/// Every chapter, appendix and section must have a title and an id.
fn validate(tree: &DocTree, intermediate: &str) -> Result<(), StructureError> {
    for id in tree.pre_order() {
        let node = tree.node(id);
        if node.node_type() == Some(NodeType::Book) {
            continue;
        }
        let err = if node.title().is_none() {
            StructureError::MissingTitle {
                path: tree.structural_path(id, ""),
                intermediate: intermediate.to_owned(),
            }
        } else if node.id().is_none() {
            StructureError::MissingId {
                path: tree.structural_path(id, ""),
                intermediate: intermediate.to_owned(),
            }
        } else {
            continue;
        };
        error!("{err}; intermediate structure: {intermediate}");
        return Err(err);
    }
    Ok(())
}
