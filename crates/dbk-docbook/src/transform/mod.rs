//! Content transformation engine.
//!
//! Renders the content of one structure node as wiki markup. The dialect's
//! content program is aimed at the node through its structural path; when
//! the node has child nodes, their sections are suppressed so each page
//! carries only its own content.

mod wiki;

use tracing::{debug, warn};
use url::Url;

use self::wiki::WikiRenderer;
use crate::dialect::Dialect;
use crate::error::{TransformError, XmlError, error_chain};
use crate::program::{ContentProgram, instantiate, template};
use crate::resolver::EntityResolver;
use crate::tree::{DocTree, NodeId};
use crate::worker::run_isolated;
use crate::xml::{Diagnostics, LoadOptions, load_document};

/// Renderer supported by content programs.
const WIKI_RENDERER: &str = "wiki";

/// Transform the content of `node` to wiki markup.
///
/// `source` is the main book file and `origin` its location. The document is
/// loaded and rendered on a dedicated worker thread.
///
/// # Errors
///
/// Returns [`TransformError`] naming the node and the instantiated program
/// when loading fails or the program does not apply to the document.
pub fn transform_node(
    source: &[u8],
    origin: &Url,
    tree: &DocTree,
    node: NodeId,
    dialect: Dialect,
    load: &LoadOptions,
    resolver: &dyn EntityResolver,
) -> Result<String, TransformError> {
    let prefix = dialect.prefix();
    let path = tree.structural_path(node, prefix);
    let suppress = if tree.node(node).has_children() {
        format!("suppress {path}/{prefix}section")
    } else {
        String::new()
    };
    let failure = |program: &str, cause: String| TransformError {
        node: tree.describe(node),
        program: program.to_owned(),
        cause,
    };

    let name = format!("content{}", dialect.postfix());
    let template = template(&name).map_err(|e| failure("", error_chain(&e)))?;
    let text = instantiate(template, &[&path, &suppress]);
    let program = ContentProgram::parse(&name, &text).map_err(|e| failure(&text, error_chain(&e)))?;

    debug!(node = %tree.describe(node), "transforming node content");
    let (result, diagnostics) = run_isolated(|| {
        let mut diagnostics = Diagnostics::default();
        let result = run_program(source, origin, &path, &program, load, resolver, &mut diagnostics);
        (result, diagnostics)
    })
    .map_err(|message| failure(&text, message))?;

    for warning in &diagnostics.warnings {
        warn!(node = %tree.describe(node), "{warning}");
    }
    let mut causes = diagnostics.errors;
    match result {
        Ok(markup) if causes.is_empty() => Ok(markup),
        Ok(_) => Err(failure(&text, causes.join("; "))),
        Err(e) => {
            causes.insert(0, error_chain(&e));
            Err(failure(&text, causes.join("; ")))
        }
    }
}

/// Load the document and render the element selected by `program`.
///
/// Document problems are returned as errors; problems applying the program
/// are recorded in `diagnostics`.
fn run_program(
    source: &[u8],
    origin: &Url,
    path: &str,
    program: &ContentProgram,
    load: &LoadOptions,
    resolver: &dyn EntityResolver,
    diagnostics: &mut Diagnostics,
) -> Result<String, XmlError> {
    let root = load_document(source, origin, resolver, load, diagnostics)?;

    if program.renderer != WIKI_RENDERER {
        diagnostics.error(format!("unsupported renderer {:?}", program.renderer));
        return Ok(String::new());
    }
    let Some(selected) = program.select.select_from_root(&root) else {
        diagnostics.error(format!("{path} matches no element of the document"));
        return Ok(String::new());
    };

    let suppressed = program
        .suppress
        .iter()
        .flat_map(|p| p.select_all_from_root(&root))
        .collect();
    let renderer = WikiRenderer::new(program.vocabulary(), &program.omit, suppressed);
    Ok(renderer.render(selected))
}
