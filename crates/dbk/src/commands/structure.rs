//! `dbk structure` command implementation.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use dbk_config::{CliSettings, Config};
use dbk_docbook::{
    ImportError, StructureOptions, file_url, find_main_book_file, parse_structure,
};

use super::{import_options, resolver};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the structure command.
#[derive(Args)]
pub(crate) struct StructureArgs {
    /// Directory with the expanded DocBook bundle.
    source: PathBuf,

    /// Source dialect: 4.3 or 5.0 (overrides config).
    #[arg(long)]
    dialect: Option<String>,

    /// Report every nested section as a node.
    #[arg(long)]
    all_section_levels: bool,

    /// Path to configuration file (default: auto-discover dbk.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl StructureArgs {
    /// Execute the structure command.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle structure cannot be parsed.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            dialect: self.dialect.clone(),
            all_section_levels: self.all_section_levels.then_some(true),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let options = import_options(&config)?;

        let main = find_main_book_file(&self.source)?;
        let main = fs::canonicalize(&main)?;
        let origin = file_url(&main).ok_or_else(|| ImportError::InvalidSource(main.clone()))?;
        let bytes = fs::read(&main)?;

        let structure = StructureOptions {
            all_section_levels: options.all_section_levels,
            load: options.load,
        };
        let tree = parse_structure(&bytes, &origin, options.dialect, &structure, &resolver(&config))?;

        output.info(&format!("{}: {} node(s)", main.display(), tree.len()));
        let json = serde_json::to_string_pretty(&tree.outline(tree.root()))?;
        output.data(&json)?;
        Ok(())
    }
}
