//! # Settings
//!
//! The installer settings: which layer indexes to consult (in priority
//! order), how to rewrite their URLs, which repo remotes are known by name,
//! which layers are always included and the project defaults.
//!
//! Settings are read from a YAML file. Every key is optional; missing keys
//! take the stock wrlinux values from [`Settings::default`].
//!
//! ```yaml
//! indexes:
//!   - description: Local Layer Index
//!     type: restapi-files
//!     url: "#INSTALL_DIR#/data/index"
//! replace:
//!   - ["git://git.wrs.com", "#BASE_URL#"]
//! base_layers: [wr-base, wr-fixes]
//! extra_groups:
//!   - key: vendor
//!     patterns: ["vendor-*"]
//! ```
//!
//! `url`, `branch` and `replace` values may contain `#INSTALL_DIR#`,
//! `#BASE_URL#` and `#BASE_BRANCH#`, which are substituted at load time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::{IndexConfig, SourceType};

/// Token replaced by the directory the installer lives in.
pub const INSTALL_DIR_TOKEN: &str = "#INSTALL_DIR#";
/// Token replaced by the base URL of the installer's git server.
pub const BASE_URL_TOKEN: &str = "#BASE_URL#";
/// Token replaced by the branch the installer is on.
pub const BASE_BRANCH_TOKEN: &str = "#BASE_BRANCH#";

/// A set of layers that is only admitted when its key is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraGroup {
    /// Name passed to `--enable-group`.
    pub key: String,
    /// Glob patterns over layer names.
    pub patterns: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Index sources, highest priority first.
    pub indexes: Vec<IndexConfig>,

    /// Literal `(find, replace)` pairs applied to index URLs.
    pub replace: Vec<(String, String)>,

    /// Known `(url prefix, remote name)` pairs, first match wins.
    pub remotes: Vec<(String, String)>,

    /// Layers that are always part of the project, resolved against the
    /// first index only.
    pub base_layers: Vec<String>,

    /// Repository name of bitbake on the openembedded-core server.
    pub bitbake: String,

    pub default_distro: String,
    pub default_machine: String,
    pub default_ktype: String,

    /// Default `repo sync -j` value.
    pub repo_jobs: usize,

    pub extra_groups: Vec<ExtraGroup>,

    /// Regex over layer names identifying download layers.
    pub download_pattern: String,
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        let mut wrs = IndexConfig::new(
            "Wind River Developer Layer Index",
            SourceType::RestApiWeb,
            "http://layers.wrs.com/layerindex/api/",
        );
        wrs.cache = Some("config/index-cache/layers_wrs_com".to_string());

        Self {
            indexes: vec![wrs],
            replace: pairs(&[("git://git.wrs.com", BASE_URL_TOKEN)]),
            remotes: pairs(&[
                ("git://git.openembedded.org", "openembedded"),
                ("git://git.yoctoproject.org", "yoctoproject"),
                ("http://git.yoctoproject.org", "http_yoctoproject"),
                ("git://github.com", "github"),
                ("https://github.com", "https_github"),
            ]),
            base_layers: vec!["wr-base".to_string(), "wr-fixes".to_string()],
            bitbake: "bitbake".to_string(),
            default_distro: "wrlinux-small".to_string(),
            default_machine: "qemux86-64".to_string(),
            default_ktype: "standard".to_string(),
            repo_jobs: 4,
            extra_groups: Vec::new(),
            download_pattern: "-dl(-|$)".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from YAML text.
    pub fn parse(yaml_content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml_content).map_err(|e| Error::Config {
            message: format!("invalid settings: {}", e),
            hint: Some("Check the settings file against the documented keys".to_string()),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config { message, hint } => Error::Config {
                message: format!("{}: {}", path.display(), message),
                hint,
            },
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.repo_jobs == 0 {
            return Err(Error::Config {
                message: "repo_jobs must be at least 1".to_string(),
                hint: None,
            });
        }
        for group in &self.extra_groups {
            if group.key.is_empty() {
                return Err(Error::Config {
                    message: "extra group with an empty key".to_string(),
                    hint: Some("Give every extra group a key for --enable-group".to_string()),
                });
            }
        }
        Ok(())
    }

    /// Configured replacements followed by the runtime tokens.
    pub fn substitutions(
        &self,
        install_dir: &str,
        base_url: &str,
        base_branch: &str,
    ) -> Vec<(String, String)> {
        let mut replace = self.replace.clone();
        replace.push((INSTALL_DIR_TOKEN.to_string(), install_dir.to_string()));
        replace.push((BASE_URL_TOKEN.to_string(), base_url.to_string()));
        replace.push((BASE_BRANCH_TOKEN.to_string(), base_branch.to_string()));
        replace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_stock_settings() {
        let settings = Settings::default();
        assert_eq!(settings.indexes.len(), 1);
        assert_eq!(settings.indexes[0].source_type, SourceType::RestApiWeb);
        assert_eq!(
            settings.indexes[0].cache.as_deref(),
            Some("config/index-cache/layers_wrs_com")
        );
        assert_eq!(settings.base_layers, vec!["wr-base", "wr-fixes"]);
        assert_eq!(settings.repo_jobs, 4);
        assert_eq!(settings.remotes[0].1, "openembedded");
    }

    #[test]
    fn test_empty_document_is_defaults() {
        let settings = Settings::parse("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r##"
indexes:
  - description: Local
    type: restapi-files
    url: "#INSTALL_DIR#/data/index"
    branch: master
  - DESCRIPTION: Dump
    TYPE: export
    URL: /srv/dump.json
replace:
  - ["git://internal", "#BASE_URL#"]
base_layers: [core]
repo_jobs: 8
extra_groups:
  - key: vendor
    patterns: ["vendor-*"]
"##;
        let settings = Settings::parse(yaml).unwrap();
        assert_eq!(settings.indexes.len(), 2);
        assert_eq!(settings.indexes[0].branch.as_deref(), Some("master"));
        assert_eq!(settings.indexes[1].source_type, SourceType::Export);
        assert_eq!(settings.replace[0].0, "git://internal");
        assert_eq!(settings.base_layers, vec!["core"]);
        assert_eq!(settings.repo_jobs, 8);
        assert_eq!(settings.extra_groups[0].patterns, vec!["vendor-*"]);
        // untouched keys keep their defaults
        assert_eq!(settings.default_machine, "qemux86-64");
    }

    #[test]
    fn test_unknown_source_type_is_config_error() {
        let yaml = "indexes:\n  - description: X\n    type: svn\n    url: /x\n";
        let err = Settings::parse(yaml).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Unknown index type 'svn'"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Settings::parse("base_layer: [core]\n").unwrap_err();
        assert!(err.to_string().contains("base_layer"));
    }

    #[test]
    fn test_zero_repo_jobs_is_rejected() {
        let err = Settings::parse("repo_jobs: 0\n").unwrap_err();
        assert!(err.to_string().contains("repo_jobs"));
    }

    #[test]
    fn test_from_file_names_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        fs::write(&path, "repo_jobs: [1]\n").unwrap();
        let err = Settings::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("settings.yaml"));
    }

    #[test]
    fn test_substitutions_append_runtime_tokens() {
        let replace = Settings::default().substitutions("/opt/wr", "git://mirror", "WRLINUX_10");
        assert_eq!(replace.len(), 4);
        assert_eq!(replace[0], ("git://git.wrs.com".to_string(), "#BASE_URL#".to_string()));
        assert_eq!(replace[3], ("#BASE_BRANCH#".to_string(), "WRLINUX_10".to_string()));
    }
}
