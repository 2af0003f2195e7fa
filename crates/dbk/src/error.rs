//! CLI error types.

use dbk_config::ConfigError;
use dbk_docbook::{BundleError, ImportError, StructureError, UnknownDialect, error_chain};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Dialect(#[from] UnknownDialect),

    #[error("{}", error_chain(.0))]
    Bundle(#[from] BundleError),

    #[error("{}", error_chain(.0))]
    Structure(#[from] StructureError),

    #[error("{}", error_chain(.0))]
    Import(#[from] ImportError),

    #[error("{0}")]
    Serialize(#[from] serde_json::Error),
}
