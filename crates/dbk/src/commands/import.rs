//! `dbk import` command implementation.

use std::path::PathBuf;

use clap::Args;
use dbk_config::{CliSettings, Config};
use dbk_docbook::{ImportPlan, Importer, publish};

use super::{import_options, resolver};
use crate::error::CliError;
use crate::output::Output;
use crate::store::DirectoryStore;

/// Arguments for the import command.
#[derive(Args)]
pub(crate) struct ImportArgs {
    /// Directory with the expanded DocBook bundle.
    source: PathBuf,

    /// Source dialect: 4.3 or 5.0 (overrides config).
    #[arg(long)]
    dialect: Option<String>,

    /// Unique page title prefix base, two or three letters or digits (overrides config).
    #[arg(long)]
    prefix: Option<String>,

    /// Import every nested section as its own page.
    #[arg(long)]
    all_section_levels: bool,

    /// Do not read entity declarations from the DTD named in the DOCTYPE.
    #[arg(long)]
    no_external_dtd: bool,

    /// Output directory for the page tree (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable the persistent resource cache.
    #[arg(long)]
    no_cache: bool,

    /// Render pages without writing them.
    #[arg(long)]
    dry_run: bool,

    /// Path to configuration file (default: auto-discover dbk.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ImportArgs {
    /// Execute the import command.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle cannot be imported.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            dialect: self.dialect.clone(),
            title_prefix_base: self.prefix.clone(),
            all_section_levels: self.all_section_levels.then_some(true),
            load_external_dtd: self.no_external_dtd.then_some(false),
            cache_enabled: self.no_cache.then_some(false),
            output_dir: self.output.clone(),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let resolver = resolver(&config);
        let importer = Importer::new(import_options(&config)?, &resolver);
        let output_dir = &config.output_resolved.dir;

        output.info(&format!("Source: {}", self.source.display()));
        let mut store = DirectoryStore::open(output_dir)?;
        let plan = importer.prepare(&self.source, &store)?;
        output.info(&format!("Main file: {}", plan.main_file.display()));

        if self.dry_run {
            print_plan(&output, &plan);
            return Ok(());
        }

        output.info(&format!("Output: {}", output_dir.display()));
        let report = publish(&plan, &mut store, None)?;
        output.success(&format!(
            "Imported {} page(s), {} attachment(s), {} label(s)",
            report.pages, report.attachments, report.labels
        ));
        Ok(())
    }
}

fn print_plan(output: &Output, plan: &ImportPlan) {
    output.highlight("\n[DRY RUN] No pages written.");
    for (index, page) in plan.pages.iter().enumerate() {
        let indent = "  ".repeat(depth(plan, index));
        output.info(&format!("{indent}{}", page.draft.title));
        for attachment in &page.attachments {
            output.info(&format!(
                "{indent}  -> {} ({})",
                attachment.file_name, attachment.content_type
            ));
        }
        if page.parent.is_some() && page.draft.body.trim().is_empty() {
            output.warning(&format!("{indent}  (empty page)"));
        }
    }
}

fn depth(plan: &ImportPlan, index: usize) -> usize {
    let mut depth = 0;
    let mut current = plan.pages.get(index).and_then(|p| p.parent);
    while let Some(parent) = current {
        depth += 1;
        current = plan.pages.get(parent).and_then(|p| p.parent);
    }
    depth
}
