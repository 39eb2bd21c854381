//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `wrlinux-setup` command-line tool. Each subcommand is defined in its own
//! file.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` (and the [`Global`]
//!   options) and performs the command's logic.
//!
//! Commands that work on layer indexes share [`IndexArgs`], which carries
//! the base URL and branch and the mirror/cache locations, and turns them
//! into a list of loaded indexes.

pub mod completions;
pub mod deps;
pub mod export;
pub mod list;
pub mod setup;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use glob::Pattern;
use log::{debug, info};

use wrlinux_setup::defaults;
use wrlinux_setup::error::Error;
use wrlinux_setup::index::Index;
use wrlinux_setup::loader::{IndexLoader, LoadOptions};
use wrlinux_setup::output::OutputConfig;
use wrlinux_setup::resolver::Resolver;
use wrlinux_setup::settings::Settings;
use wrlinux_setup::suggestions;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Global {
    pub settings: Option<PathBuf>,
    pub install_dir: PathBuf,
    pub output: OutputConfig,
}

impl Global {
    /// The `--settings` file, else `data/settings.yaml` in the install
    /// directory, else the built-in settings.
    pub fn load_settings(&self) -> Result<Settings> {
        if let Some(path) = &self.settings {
            if !path.exists() {
                return Err(suggestions::settings_not_found(path));
            }
            info!("Using settings from {}", path.display());
            return Ok(Settings::from_file(path)?);
        }

        let installed = defaults::settings_file(&self.install_dir);
        if installed.exists() {
            info!("Using settings from {}", installed.display());
            return Ok(Settings::from_file(&installed)?);
        }

        debug!("Using built-in settings");
        Ok(Settings::default())
    }
}

/// Where the layer indexes come from.
#[derive(Args, Debug, Clone, Default)]
pub struct IndexArgs {
    /// Base URL of the git server the installer was fetched from
    #[arg(long, value_name = "URL", env = "OE_BASEURL")]
    pub base_url: Option<String>,

    /// Branch the installer is on
    #[arg(long, value_name = "BRANCH", env = "OE_BASEBRANCH")]
    pub base_branch: Option<String>,

    /// Directory of serialized indexes to use instead of the configured sources
    #[arg(long, value_name = "DIR")]
    pub mirror_index: Option<PathBuf>,

    /// Directory relative index cache paths are resolved against
    #[arg(long, value_name = "DIR", env = "WRLINUX_SETUP_CACHE")]
    pub cache_root: Option<PathBuf>,
}

/// Indexes loaded for one run, with the values they were loaded with.
#[derive(Debug)]
pub struct LoadedIndexes {
    pub indexes: Vec<Index>,
    pub base_url: String,
    pub base_branch: String,
}

impl IndexArgs {
    /// The base URL and branch, both of which are mandatory.
    pub fn require_base(&self) -> Result<(String, String)> {
        let base_url = self
            .base_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(suggestions::missing_base_url)?;
        let base_branch = self
            .base_branch
            .clone()
            .filter(|branch| !branch.is_empty())
            .ok_or_else(suggestions::missing_base_branch)?;
        Ok((base_url, base_branch))
    }

    /// Load every index `settings` configures.
    pub fn load(&self, global: &Global, settings: &Settings) -> Result<LoadedIndexes> {
        let (base_url, base_branch) = self.require_base()?;
        let install_dir = global.install_dir.display().to_string();

        let options = LoadOptions {
            base_branch: Some(base_branch.clone()),
            replace: settings.substitutions(&install_dir, &base_url, &base_branch),
            mirror: self.mirror_index.clone(),
            cache_root: Some(
                self.cache_root
                    .clone()
                    .unwrap_or_else(defaults::default_cache_root),
            ),
        };

        let loader = IndexLoader::with_default_client()?;
        let indexes = match loader.load_indexes(&settings.indexes, &options) {
            Ok(indexes) => indexes,
            Err(Error::NoIndexes) => return Err(suggestions::no_usable_index()),
            Err(e) => return Err(e.into()),
        };
        if indexes.is_empty() {
            return Err(suggestions::no_usable_index());
        }

        Ok(LoadedIndexes {
            indexes,
            base_url,
            base_branch,
        })
    }
}

/// A resolver, with settings mistakes reported as hints.
pub fn build_resolver<'a>(
    indexes: &'a [Index],
    settings: &'a Settings,
    base_branch: &'a str,
) -> Result<Resolver<'a>> {
    Resolver::new(indexes, settings, Some(base_branch)).map_err(|e| match e {
        Error::Regex(error) => suggestions::invalid_regex(&settings.download_pattern, &error),
        Error::Glob(error) => {
            let pattern = settings
                .extra_groups
                .iter()
                .flat_map(|group| group.patterns.iter())
                .find(|p| Pattern::new(p).is_err())
                .map(String::as_str)
                .unwrap_or_default();
            suggestions::invalid_glob(pattern, &error)
        }
        other => other.into(),
    })
}

/// `path`, or the current directory.
pub fn dir_or_current(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Split comma separated values; `--layers a,b --layers c` gives `[a, b, c]`.
pub fn split_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn global(install_dir: &Path, settings: Option<PathBuf>) -> Global {
        Global {
            settings,
            install_dir: install_dir.to_path_buf(),
            output: OutputConfig::from_env_and_flag("never"),
        }
    }

    #[test]
    fn test_split_values() {
        let values = vec!["a,b".to_string(), " c ".to_string(), ",".to_string()];
        assert_eq!(split_values(&values), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_require_base_reports_missing_url_first() {
        let args = IndexArgs {
            base_branch: Some("master".to_string()),
            ..Default::default()
        };
        let err = args.require_base().unwrap_err();
        assert!(err.to_string().contains("Unable to determine base url"));

        let args = IndexArgs {
            base_url: Some("git://example.com".to_string()),
            base_branch: Some(String::new()),
            ..Default::default()
        };
        let err = args.require_base().unwrap_err();
        assert!(err.to_string().contains("Unable to determine base branch"));
    }

    #[test]
    fn test_settings_fall_back_to_builtin() {
        let temp = TempDir::new().unwrap();
        let settings = global(temp.path(), None).load_settings().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_from_install_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("data")).unwrap();
        std::fs::write(temp.path().join("data/settings.yaml"), "repo_jobs: 2\n").unwrap();

        let settings = global(temp.path(), None).load_settings().unwrap();
        assert_eq!(settings.repo_jobs, 2);
    }

    #[test]
    fn test_missing_settings_file_has_hint() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yaml");
        let err = global(temp.path(), Some(missing)).load_settings().unwrap_err();
        assert!(err.to_string().contains("Settings file not found"));
        assert!(err.to_string().contains("hint:"));
    }

    #[test]
    fn test_no_usable_index_is_reported_with_hints() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::parse(&format!(
            "indexes:\n  - description: Missing\n    type: restapi-files\n    url: {}\n",
            temp.path().join("missing").display()
        ))
        .unwrap();
        let args = IndexArgs {
            base_url: Some("git://example.com".to_string()),
            base_branch: Some("master".to_string()),
            cache_root: Some(temp.path().to_path_buf()),
            ..Default::default()
        };

        let err = args.load(&global(temp.path(), None), &settings).unwrap_err();
        assert!(err.to_string().contains("No usable layer index could be loaded"));
    }

    #[test]
    fn test_invalid_download_pattern_has_hint() {
        let settings = Settings {
            download_pattern: "(-dl".to_string(),
            ..Settings::default()
        };
        let err = build_resolver(&[], &settings, "master").err().unwrap();
        assert!(err.to_string().contains("Invalid regex pattern: (-dl"));
    }
}
