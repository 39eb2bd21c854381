//! # Setup Command Implementation
//!
//! The setup command builds or updates a project checkout:
//!
//! 1. Load the settings and every configured layer index.
//! 2. Resolve the requested distros, machines, layers, recipes and templates
//!    into the required and recommended layer lists.
//! 3. Compute the repo remotes and render `default.xml`.
//! 4. Write the project files: `layers/local`, `.templateconf`, the sample
//!    configs, the manifest and `.gitignore`.
//! 5. Commit the configuration with `git` and sync the layers with `repo`.
//!
//! `--dry-run` stops after step 3 and prints the result; `--no-sync` stops
//! after step 4.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use log::info;

use super::{build_resolver, dir_or_current, split_values, Global, IndexArgs};
use wrlinux_setup::defaults;
use wrlinux_setup::index::Index;
use wrlinux_setup::manifest::{self, ManifestOptions};
use wrlinux_setup::output::{heading, marker, OutputConfig};
use wrlinux_setup::project::{self, ProjectContext};
use wrlinux_setup::resolver::{Remotes, Resolution, Selection};
use wrlinux_setup::settings::Settings;
use wrlinux_setup::sync::{self, CommandRunner, SystemRunner};

/// Resolve layers, write the project configuration and sync it
#[derive(Args, Debug, Default)]
pub struct SetupArgs {
    /// Distros to support (comma separated, repeatable)
    #[arg(long, value_name = "DISTRO,...")]
    pub distros: Vec<String>,

    /// Machines to support (comma separated, repeatable)
    #[arg(long, value_name = "MACHINE,...")]
    pub machines: Vec<String>,

    /// Additional layers (comma separated, repeatable)
    #[arg(long, value_name = "LAYER,...")]
    pub layers: Vec<String>,

    /// Layers providing these recipes (comma separated, repeatable)
    #[arg(long, value_name = "RECIPE,...")]
    pub recipes: Vec<String>,

    /// Templates to enable (comma separated, repeatable)
    #[arg(long, value_name = "TEMPLATE,...")]
    pub templates: Vec<String>,

    /// Select every layer of every index
    #[arg(long)]
    pub all_layers: bool,

    /// Keep download (-dl) layers among the recommendations
    #[arg(long)]
    pub dl_layers: bool,

    /// Only include required layers
    #[arg(long)]
    pub no_recommend: bool,

    /// Allow layers of an extra group (repeatable)
    #[arg(long, value_name = "KEY")]
    pub enable_group: Vec<String>,

    /// Set up a mirror instead of a project
    #[arg(long)]
    pub mirror: bool,

    /// Parallel jobs for repo sync (defaults to the settings value)
    #[arg(long, value_name = "N")]
    pub repo_jobs: Option<usize>,

    /// Default kernel type (defaults to the settings value)
    #[arg(long, value_name = "TYPE")]
    pub kernel: Option<String>,

    /// Write the project files without running git or repo
    #[arg(long)]
    pub no_sync: bool,

    /// Print the resolved layers and manifest without writing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub project_dir: Option<std::path::PathBuf>,

    #[command(flatten)]
    pub index: IndexArgs,
}

impl SetupArgs {
    /// The resolver input; distros and machines fall back to the settings
    /// defaults.
    pub fn selection(&self, settings: &Settings) -> Selection {
        let or_default = |values: Vec<String>, default: &str| {
            if values.is_empty() {
                vec![default.to_string()]
            } else {
                values
            }
        };

        Selection {
            layers: split_values(&self.layers),
            distros: or_default(split_values(&self.distros), &settings.default_distro),
            machines: or_default(split_values(&self.machines), &settings.default_machine),
            recipes: split_values(&self.recipes),
            templates: split_values(&self.templates),
            all_layers: self.all_layers,
            dl_layers: self.dl_layers,
            no_recommend: self.no_recommend,
            enabled_groups: split_values(&self.enable_group),
        }
    }
}

/// Everything the project files are written from.
#[derive(Debug)]
pub struct Plan {
    pub resolution: Resolution,
    pub manifest: String,
    pub context: ProjectContext,
    pub jobs: usize,
}

/// Resolve the selection and render the manifest.
pub fn plan(
    args: &SetupArgs,
    settings: &Settings,
    indexes: &[Index],
    base_url: &str,
    base_branch: &str,
    fragments: Option<&Path>,
    setup_args: &str,
) -> Result<Plan> {
    let selection = args.selection(settings);
    info!("Setting distro to {:?}", selection.distros);
    info!("Setting machine to {:?}", selection.machines);
    info!("Setting layers to {:?}", selection.layers);
    info!("Setting recipes to {:?}", selection.recipes);
    info!("Setting templates to {:?}", selection.templates);

    let resolver = build_resolver(indexes, settings, base_branch)?;
    let resolution = resolver.resolve(&selection)?;

    let remotes = Remotes::compute(
        base_url,
        &settings.remotes,
        resolution.layers().map(|layer| layer.vcs_url.as_str()),
    );

    let jobs = args.repo_jobs.unwrap_or(settings.repo_jobs).max(1);
    let manifest = manifest::render(
        &resolution,
        &remotes,
        &ManifestOptions {
            base_branch,
            jobs,
            bitbake: &settings.bitbake,
            fragments,
        },
    )?;

    let mut context = ProjectContext::from_resolution(indexes, &resolution);
    context.setup_args = setup_args.to_string();
    context.default_machine = selection.machines[0].clone();
    context.default_distro = selection.distros[0].clone();
    context.templates = selection.templates.clone();
    context.ktype = args
        .kernel
        .clone()
        .unwrap_or_else(|| settings.default_ktype.clone());

    Ok(Plan {
        resolution,
        manifest,
        context,
        jobs,
    })
}

/// Human readable list of the resolved layers.
pub fn summary(resolution: &Resolution, output: &OutputConfig) -> String {
    let mut out = String::new();
    for (title, layers) in [
        ("Required layers", &resolution.required),
        ("Recommended layers", &resolution.recommended),
    ] {
        let _ = writeln!(out, "{}", heading(output, title));
        if layers.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for layer in layers {
            let _ = writeln!(out, "  {:30} {} ({})", layer.name, layer.layer_path(), layer.revision);
        }
    }
    out
}

/// Write the project files for `plan` into `project_dir`.
pub fn write_project(project_dir: &Path, install_dir: &Path, plan: &Plan, mirror: bool) -> Result<()> {
    fs::create_dir_all(project_dir)?;

    if !mirror && !project_dir.join(".git").exists() {
        project::setup_local_layer(&defaults::local_layer_template(install_dir), project_dir)?;
    }

    project::write_templateconf(project_dir)?;
    project::write_samples(&defaults::samples_dir(install_dir), project_dir, &plan.context)?;

    let path = manifest::write(project_dir, &plan.manifest)?;
    info!("Wrote {}", path.display());

    let destinations = manifest::linkfile_destinations(&plan.manifest)?;
    project::update_gitignore(project_dir, &destinations)?;
    Ok(())
}

/// Commit the configuration and sync the layers.
pub fn sync_project(
    runner: &dyn CommandRunner,
    project_dir: &Path,
    setup_args: &str,
    mirror: bool,
    jobs: usize,
) -> Result<()> {
    sync::commit_config(runner, project_dir, setup_args)?;
    sync::repo_sync(runner, project_dir, mirror, jobs)?;
    Ok(())
}

/// Execute the `setup` command.
pub fn execute(args: SetupArgs, global: &Global) -> Result<()> {
    let setup_args = std::env::args().skip(1).collect::<Vec<_>>().join(" ");

    let settings = global.load_settings()?;
    let loaded = args.index.load(global, &settings)?;

    let fragments = defaults::fragments_dir(&global.install_dir);
    let plan = plan(
        &args,
        &settings,
        &loaded.indexes,
        &loaded.base_url,
        &loaded.base_branch,
        Some(&fragments),
        &setup_args,
    )?;

    print!("{}", summary(&plan.resolution, &global.output));

    if args.dry_run {
        println!();
        print!("{}", plan.manifest);
        return Ok(());
    }

    let project_dir = dir_or_current(args.project_dir.as_deref())?;
    write_project(&project_dir, &global.install_dir, &plan, args.mirror)?;

    if args.no_sync {
        println!(
            "{} Project files written to {}",
            marker(&global.output, "✅", "[OK]"),
            project_dir.display()
        );
        return Ok(());
    }

    sync_project(&SystemRunner, &project_dir, &setup_args, args.mirror, plan.jobs)?;
    println!(
        "{} Project ready in {}",
        marker(&global.output, "✅", "[OK]"),
        project_dir.display()
    );
    Ok(())
}
