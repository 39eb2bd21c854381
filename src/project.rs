//! # Project Files
//!
//! Writes the configuration files of a project checkout from the resolved
//! layers: the rendered sample configs, `.templateconf`, `.gitignore` and
//! the initial `layers/local` layer.
//!
//! Sample files are plain text with line placeholders. A line holding a
//! list placeholder (`####LAYERS####`, `####MACHINES####`,
//! `####DISTROS####`) is repeated once per item; every other placeholder is
//! replaced in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::resolver::Resolution;

pub const LAYERS: &str = "####LAYERS####";
pub const SETUP_ARGS: &str = "####SETUP_ARGS####";
pub const MACHINES: &str = "####MACHINES####";
pub const DEFAULT_MACHINE: &str = "####DEFAULTMACHINE####";
pub const DISTROS: &str = "####DISTROS####";
pub const DEFAULT_DISTRO: &str = "####DEFAULTDISTRO####";
pub const DEFAULT_TEMPLATE: &str = "####DEFAULTWRTEMPLATE####";
pub const DEFAULT_KTYPE: &str = "####DEFAULTKTYPE####";

/// `(sample, destination, required)`; samples live in `data/samples`.
pub const SAMPLES: &[(&str, &str, bool)] = &[
    ("README.sample", "README", true),
    ("bblayers.conf.sample", "config/bblayers.conf.sample", true),
    ("conf-notes.sample", "config/conf-notes.txt", true),
    ("local.conf.sample", "config/local.conf.sample", true),
    ("site.conf.sample", "config/site.conf.sample", false),
];

pub const TEMPLATECONF_FILE: &str = ".templateconf";
const TEMPLATECONF: &str = "# Project template settings\nTEMPLATECONF=${TEMPLATECONF:-$OEROOT/config}\n";

pub const GITIGNORE_FILE: &str = ".gitignore";
pub const GITIGNORE_DEFAULTS: &[&str] = &[
    ".repo*",
    "*.pyc",
    "*.pyo",
    "*.swp",
    "*.orig",
    "*.rej",
    "*~",
    "/bin/buildtools*",
    "/environment-setup-*",
    "/layers/*",
    "!layers/local",
];

/// Files a configuration change may touch, relative to the project.
pub const CONFIG_FILES: &[&str] = &[
    "layers/local",
    ".templateconf",
    "config/bblayers.conf.sample",
    "config/conf-notes.txt",
    "config/local.conf.sample",
    "README",
    "default.xml",
    ".gitignore",
];

/// Values substituted into the sample files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectContext {
    /// Layer paths relative to the project root.
    pub layers: Vec<String>,
    pub setup_args: String,
    /// Machine name to description.
    pub machines: BTreeMap<String, String>,
    /// Distro name to description.
    pub distros: BTreeMap<String, String>,
    pub default_machine: String,
    pub default_distro: String,
    pub templates: Vec<String>,
    pub ktype: String,
}

impl ProjectContext {
    /// Collect layer paths, machines and distros of every resolved layer.
    pub fn from_resolution(indexes: &[Index], resolution: &Resolution) -> Self {
        let mut context = ProjectContext::default();
        for layer in resolution.layers() {
            context.layers.push(layer.layer_path());

            let index = &indexes[layer.index];
            for machine in index
                .machines
                .iter()
                .filter(|m| m.layerbranch == layer.layer_branch_id)
            {
                let description = machine.description.clone().unwrap_or_default();
                let description = if description.is_empty() { machine.name.clone() } else { description };
                context.machines.insert(machine.name.clone(), description);
            }
            for distro in index
                .distros
                .iter()
                .filter(|d| d.layerbranch == layer.layer_branch_id)
            {
                let description = distro.description.clone().unwrap_or_default();
                let description = if description.is_empty() { distro.name.clone() } else { description };
                context.distros.insert(distro.name.clone(), description);
            }
        }
        context
    }
}

/// `layer:name` selectors name the item after the first `:`.
fn strip_layer(selector: &str) -> &str {
    selector.split_once(':').map_or(selector, |(_, name)| name)
}

/// Render one sample file.
pub fn render_sample(sample: &str, context: &ProjectContext) -> String {
    let mut out = String::with_capacity(sample.len());
    for line in sample.split_inclusive('\n') {
        if line.contains(LAYERS) {
            for layer in &context.layers {
                out.push_str(&line.replace(LAYERS, &format!("##OEROOT##/{}", layer)));
            }
        } else if line.contains(SETUP_ARGS) {
            out.push_str(&line.replace(SETUP_ARGS, &context.setup_args));
        } else if line.contains(MACHINES) {
            for (name, description) in &context.machines {
                out.push_str(&format!("# {}\n", description.trim()));
                out.push_str(&line.replace(MACHINES, name));
            }
        } else if line.contains(DEFAULT_MACHINE) {
            out.push_str(&line.replace(DEFAULT_MACHINE, strip_layer(&context.default_machine)));
        } else if line.contains(DISTROS) {
            for (name, description) in &context.distros {
                out.push_str(&format!("# {}\n", description.trim()));
                out.push_str(&line.replace(DISTROS, name));
            }
        } else if line.contains(DEFAULT_DISTRO) {
            out.push_str(&line.replace(DEFAULT_DISTRO, strip_layer(&context.default_distro)));
        } else if line.contains(DEFAULT_TEMPLATE) {
            out.push_str(&line.replace(DEFAULT_TEMPLATE, &context.templates.join(" ")));
        } else if line.contains(DEFAULT_KTYPE) {
            out.push_str(&line.replace(DEFAULT_KTYPE, &context.ktype));
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Render every sample from `samples_dir` into the project.
pub fn write_samples(samples_dir: &Path, project_dir: &Path, context: &ProjectContext) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (sample, destination, required) in SAMPLES {
        let source = samples_dir.join(sample);
        if !source.exists() {
            if *required {
                return Err(Error::Config {
                    message: format!("sample file {} not found", source.display()),
                    hint: Some("Run from a complete installer checkout".to_string()),
                });
            }
            continue;
        }

        let target = project_dir.join(destination);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = render_sample(&fs::read_to_string(&source)?, context);
        fs::write(&target, rendered)?;
        debug!("Rendered {} to {}", source.display(), target.display());
        written.push(target);
    }
    Ok(written)
}

/// Write `.templateconf` unless it exists. Returns whether it was written.
pub fn write_templateconf(project_dir: &Path) -> Result<bool> {
    let path = project_dir.join(TEMPLATECONF_FILE);
    if path.exists() {
        return Ok(false);
    }
    fs::write(&path, TEMPLATECONF)?;
    Ok(true)
}

/// Append the default ignore entries and `extra` to `.gitignore`, skipping
/// lines it already has. Returns the number of lines added.
pub fn update_gitignore(project_dir: &Path, extra: &[String]) -> Result<usize> {
    let path = project_dir.join(GITIGNORE_FILE);
    let mut content = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let mut existing: Vec<String> = content.lines().map(str::to_string).collect();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }

    let mut added = 0;
    let wanted = GITIGNORE_DEFAULTS.iter().map(|s| s.to_string()).chain(extra.iter().cloned());
    for entry in wanted {
        if existing.contains(&entry) {
            continue;
        }
        content.push_str(&entry);
        content.push('\n');
        existing.push(entry);
        added += 1;
    }

    if added > 0 {
        fs::write(&path, content)?;
    }
    Ok(added)
}

/// Copy the template local layer to `layers/local` unless it exists.
pub fn setup_local_layer(template: &Path, project_dir: &Path) -> Result<bool> {
    let target = project_dir.join("layers/local");
    if target.exists() {
        return Ok(false);
    }
    if !template.exists() {
        warn!("No local layer template at {}, skipping", template.display());
        return Ok(false);
    }

    info!("Creating {}", target.display());
    for entry in WalkDir::new(template).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        let relative = entry.path().strip_prefix(template).map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(true)
}
