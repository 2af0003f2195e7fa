//! Error types for DocBook import.

use std::error::Error;
use std::path::PathBuf;

/// Invalid input to a structure tree operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Node added to a tree before its type was set.
    #[error("node type must be set before the node is added to a tree")]
    MissingType,

    /// Blank media reference.
    #[error("media reference must not be blank")]
    BlankMediaRef,
}

/// Failure resolving an external reference.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// Network fetch failed.
    #[error("Error retrieving external resource from URL {url} with message: {message}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport or HTTP status message.
        message: String,
    },

    /// Local file could not be read.
    #[error("failed to read {}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure loading an XML document.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum XmlError {
    /// XML syntax error.
    #[error("XML parse error")]
    Parse(#[from] quick_xml::Error),

    /// XML attribute error.
    #[error("XML attribute error")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// Encoding error during XML parsing.
    #[error("encoding error")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    /// External reference could not be resolved.
    #[error("failed to resolve external reference")]
    Resolve(#[from] ResolveError),

    /// Referenced resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Reference is not a valid URL relative to its document.
    #[error("invalid reference {reference} relative to {base}")]
    InvalidReference {
        /// Reference as written.
        reference: String,
        /// Base URL of the referencing document.
        base: String,
    },

    /// Structurally broken document.
    #[error("malformed document {url}: {message}")]
    Malformed {
        /// Document URL.
        url: String,
        /// What is wrong.
        message: String,
    },

    /// Include or entity nesting too deep (usually a cycle).
    #[error("nesting limit exceeded while loading {0}")]
    TooDeep(String),
}

/// Invalid transform program.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// No program with this name.
    #[error("unknown program {0}")]
    Unknown(String),

    /// Syntax error in the program text.
    #[error("program {program}, line {line}: {message}")]
    Syntax {
        /// Program name.
        program: String,
        /// 1-based line number.
        line: usize,
        /// What is wrong.
        message: String,
    },
}

/// Failure producing the structure tree.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StructureError {
    /// Source document could not be loaded.
    #[error("failed to load document")]
    Xml(#[from] XmlError),

    /// Extraction program is invalid.
    #[error("invalid structure program")]
    Program(#[from] ProgramError),

    /// Extraction program did not match the document.
    #[error("structure extraction failed: {0}")]
    Extraction(String),

    /// Intermediate structure could not be turned into a tree.
    #[error("invalid document structure: {message}")]
    Builder {
        /// What is wrong.
        message: String,
        /// Intermediate XML produced by the extraction program.
        intermediate: String,
    },

    /// Required node has no title.
    #[error("Item without title: {path}")]
    MissingTitle {
        /// Structural path of the node.
        path: String,
        /// Intermediate XML the tree was built from.
        intermediate: String,
    },

    /// Required node has no id.
    #[error("Item without id: {path}")]
    MissingId {
        /// Structural path of the node.
        path: String,
        /// Intermediate XML the tree was built from.
        intermediate: String,
    },

    /// Isolated worker failed.
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Failure transforming one node to wiki markup.
#[derive(Debug, thiserror::Error)]
#[error("transformation of {node} failed: {cause}")]
pub struct TransformError {
    /// Node identity (structural path and id).
    pub node: String,
    /// Instantiated program text.
    pub program: String,
    /// Flattened cause chain.
    pub cause: String,
}

/// Failure reported by a target store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Store refused the operation.
    #[error("{0}")]
    Rejected(String),
}

/// Failure assigning unique titles.
#[derive(Debug, thiserror::Error)]
pub enum TitleError {
    /// Collision and no prefix base configured.
    #[error(
        "Can't generate unique page title because 'Unique page title prefix base' is not provided."
    )]
    PrefixBaseMissing,

    /// All prefixes derived from the base collide.
    #[error(
        "Can't generate unique page title because 'Unique page title prefix base' is exhausted (use another please)."
    )]
    PrefixBaseExhausted,

    /// Title lookup in the target store failed.
    #[error("title lookup failed")]
    Store(#[from] StoreError),
}

/// Failure inspecting or preparing an import bundle.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// No file with a `<book>` root element.
    #[error("No main DocBook file containing <book> root element found in {}", .0.display())]
    NoMainFile(PathBuf),
}

/// Failure of a whole import run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ImportError {
    /// Bundle error.
    #[error("bundle error")]
    Bundle(#[from] BundleError),

    /// Structure error.
    #[error("structure error")]
    Structure(#[from] StructureError),

    /// Referenced local media files are missing.
    #[error("{}", .0.join("; "))]
    MissingMedia(Vec<String>),

    /// Title uniqueness error.
    #[error("title error")]
    Title(#[from] TitleError),

    /// Transformation error.
    #[error("conversion error")]
    Transform(#[from] TransformError),

    /// Target store error.
    #[error("target store error")]
    Store(#[from] StoreError),

    /// Page without a title.
    #[error("Title for book/chapters/sections must be defined: {0}")]
    MissingTitle(String),

    /// Source path cannot be turned into a document URL.
    #[error("invalid source path {}", .0.display())]
    InvalidSource(PathBuf),
}

/// Flatten an error and its sources into one `a: b: c` message.
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_flattens_sources() {
        let err = StructureError::Xml(XmlError::Resolve(ResolveError::Fetch {
            url: "http://example.com/a.dtd".to_owned(),
            message: "HTTP 404".to_owned(),
        }));
        assert_eq!(
            error_chain(&err),
            "failed to load document: failed to resolve external reference: \
             Error retrieving external resource from URL http://example.com/a.dtd with message: HTTP 404"
        );
    }

    #[test]
    fn test_error_chain_without_source() {
        let err = StructureError::MissingId {
            path: "book/chapter[2]".to_owned(),
            intermediate: String::new(),
        };
        assert_eq!(error_chain(&err), "Item without id: book/chapter[2]");
    }
}
