//! # Export Command Implementation
//!
//! Loads the configured indexes (or a single index given on the command
//! line) and writes each of them below an output directory, named after its
//! description:
//!
//! - `--format rest` (default): the REST API shape, readable by the
//!   `restapi-files` loader.
//! - `--format export`: the flat `{pk, model, fields}` export shape.
//! - `--split`: one file per layer-branch instead of one per index.
//! - `--mirror`: rewrite layer URLs to `#BASE_URL#` and keep `CFG`, for use
//!   with `--mirror-index`. Mirrors are always REST shaped, so `--mirror`
//!   cannot be combined with `--format`.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use log::info;

use super::{Global, IndexArgs};
use wrlinux_setup::index::{IndexConfig, SourceType};
use wrlinux_setup::output::marker;
use wrlinux_setup::serialize::{self, Format, SerializeOptions};
use wrlinux_setup::settings::Settings;
use wrlinux_setup::suggestions;

/// Output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// REST API tables
    Rest,
    /// Flat pk/model/fields records
    Export,
}

impl From<ExportFormat> for Format {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Rest => Format::RestApi,
            ExportFormat::Export => Format::Export,
        }
    }
}

/// Write the loaded indexes back out as JSON
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Output shape
    #[arg(long, value_enum, default_value = "rest")]
    pub format: ExportFormat,

    /// One file per layer-branch
    #[arg(long)]
    pub split: bool,

    /// Rewrite layer URLs for a mirror (REST shape only)
    #[arg(long, conflicts_with = "format")]
    pub mirror: bool,

    /// Keep the CFG and apilinks entries
    #[arg(long)]
    pub bookkeeping: bool,

    /// Type of a single index to export instead of the configured ones
    #[arg(long, value_name = "TYPE", requires = "index_url")]
    pub index_type: Option<String>,

    /// URL or path of the single index
    #[arg(long, value_name = "URL", requires = "index_type")]
    pub index_url: Option<String>,

    /// Description of the single index
    #[arg(long, value_name = "TEXT", default_value = "Layer Index")]
    pub index_description: String,

    #[command(flatten)]
    pub index: IndexArgs,
}

impl ExportArgs {
    /// The settings with the command line index, if any, in place of the
    /// configured ones.
    fn settings(&self, mut settings: Settings) -> Result<Settings> {
        if let (Some(kind), Some(url)) = (&self.index_type, &self.index_url) {
            let source_type: SourceType = kind
                .parse()
                .map_err(|_| suggestions::unknown_source_type(kind))?;
            settings.indexes = vec![IndexConfig::new(
                self.index_description.as_str(),
                source_type,
                url.as_str(),
            )];
        }
        Ok(settings)
    }

    fn options(&self) -> SerializeOptions {
        SerializeOptions {
            format: self.format.into(),
            split: self.split,
            mirror: self.mirror,
            include_bookkeeping: self.bookkeeping,
        }
    }
}

/// Execute the `export` command.
pub fn execute(args: ExportArgs, global: &Global) -> Result<()> {
    let settings = args.settings(global.load_settings()?)?;
    let loaded = args.index.load(global, &settings)?;
    let options = args.options();

    fs::create_dir_all(&args.output)?;
    for index in &loaded.indexes {
        info!(
            "Writing {} ({:?}, split={})",
            index.description(),
            options.format,
            options.split
        );
        let base = args.output.join(index.description());
        let written = serialize::write_index(index, &base, &options)?;
        println!(
            "{} {}: {} file(s) written to {}",
            marker(&global.output, "✅", "[OK]"),
            index.description(),
            written.len(),
            args.output.display()
        );
    }
    Ok(())
}
