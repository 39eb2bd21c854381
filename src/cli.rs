//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::debug;

use crate::commands;
use wrlinux_setup::defaults;
use wrlinux_setup::output::OutputConfig;

/// wrlinux-setup - Fetch and set up a Wind River Linux project
#[derive(Parser, Debug)]
#[command(name = "wrlinux-setup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to <install dir>/data/settings.yaml, else the built-in settings)
    #[arg(long, global = true, value_name = "FILE", env = "WRLINUX_SETUP_SETTINGS")]
    settings: Option<PathBuf>,

    /// Installer directory holding data/ (defaults to the executable's directory)
    #[arg(long, global = true, value_name = "DIR")]
    install_dir: Option<PathBuf>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve layers, write the project configuration and sync it
    Setup(commands::setup::SetupArgs),

    /// List the layers, distros, machines, recipes or templates of each index
    List(commands::list::ListArgs),

    /// Show the required and recommended dependencies of every layer
    Deps(commands::deps::DepsArgs),

    /// Write the loaded indexes back out as JSON
    Export(commands::export::ExportArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

fn init_logging(level: &str, output: &OutputConfig) {
    // a second init (tests driving the CLI in-process) keeps the first logger
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .write_style(output.write_style())
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let output = OutputConfig::from_env_and_flag(&self.color);
        let level = if self.verbose { "debug" } else { self.log_level.as_str() };
        init_logging(level, &output);

        let global = commands::Global {
            settings: self.settings,
            install_dir: self.install_dir.unwrap_or_else(defaults::default_install_dir),
            output,
        };
        debug!("Install dir is {}", global.install_dir.display());

        match self.command {
            Commands::Setup(args) => commands::setup::execute(args, &global),
            Commands::List(args) => commands::list::execute(args, &global),
            Commands::Deps(args) => commands::deps::execute(args, &global),
            Commands::Export(args) => commands::export::execute(args, &global),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
