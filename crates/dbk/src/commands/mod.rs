//! CLI command implementations.

pub(crate) mod import;
pub(crate) mod structure;

pub(crate) use import::ImportArgs;
pub(crate) use structure::StructureArgs;

use std::sync::Arc;

use dbk_cache::ResourceCache;
use dbk_config::Config;
use dbk_docbook::{CachingResolver, Dialect, FileResolver, ImportOptions, xml::LoadOptions};

use crate::error::CliError;

/// Resolver for external references, cached as configured.
fn resolver(config: &Config) -> CachingResolver {
    let cache = ResourceCache::new(
        config.cache_resolved.memory_capacity,
        config.cache_resolved.persistent_dir(),
    );
    CachingResolver::new(Arc::new(cache)).with_fallback(Box::new(FileResolver))
}

/// Import options from the `[import]` section.
fn import_options(config: &Config) -> Result<ImportOptions, CliError> {
    let dialect: Dialect = config.import.dialect.parse()?;
    Ok(ImportOptions {
        dialect,
        title_prefix_base: config.import.prefix_base().map(str::to_owned),
        all_section_levels: config.import.all_section_levels,
        load: LoadOptions {
            load_external_dtd: config.import.load_external_dtd,
            ..LoadOptions::default()
        },
        labels: config.import.labels.clone(),
    })
}
