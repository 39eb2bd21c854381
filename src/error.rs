//! # Error Handling
//!
//! This module defines the centralized error type for the `wrlinux-setup`
//! library. It uses `thiserror` to build an `Error` enum that covers every
//! failure mode of index loading, layer resolution, serialization and project
//! emission.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries enough context (index
//!   description, table, record id, command line, ...) to produce a useful
//!   diagnostic without a backtrace.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Some conditions are deliberately *not* errors: an unreachable index source
//! or a dependency edge pointing at a missing layer are logged and the run
//! continues with degraded input. Everything that is represented here aborts
//! the run.

use std::fmt;

use thiserror::Error;

/// A selector (layer, distro, machine, recipe, template or base layer) that
/// matched nothing in any configured index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSelector {
    /// What kind of selector this was (`layer`, `distro`, ...).
    pub kind: String,
    /// The value exactly as requested, including any `layer:` prefix.
    pub value: String,
    /// Known values that are close to `value`.
    pub close_matches: Vec<String>,
}

impl fmt::Display for UnresolvedSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" not found", self.kind, self.value)?;
        if !self.close_matches.is_empty() {
            write!(f, " (close matches: {})", self.close_matches.join(", "))?;
        }
        Ok(())
    }
}

/// A layer that the closure pulled in from an opt-in group the caller did not
/// enable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayer {
    /// Layer name.
    pub layer: String,
    /// Key of the extra group the layer belongs to.
    pub group: String,
}

fn join_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("\n  {}", item))
        .collect::<String>()
}

fn join_group_layers(items: &[GroupLayer]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "\n  {} (enable with --enable-group {})",
                item.layer, item.group
            )
        })
        .collect::<String>()
}

/// Main error type for wrlinux-setup operations
#[derive(Error, Debug)]
pub enum Error {
    /// The settings file (or a programmatic configuration) is invalid.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An index source descriptor names a type no loader implements.
    #[error("Unknown index type '{kind}' (expected restapi-web, restapi-files or export)")]
    UnknownSourceType { kind: String },

    /// A fetch failed in a way that is worth retrying once
    /// (connection reset, connect failure).
    #[error("Transient network error: {url} - {message}")]
    TransientNetwork { url: String, message: String },

    /// A fetch failed permanently.
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// A configured index source path does not exist.
    #[error("Index {description}: could not find path {path}")]
    SourceNotFound { description: String, path: String },

    /// Two records share an id but differ in content.
    #[error(
        "Data integrity error in {table} id {id}: records differ\n  existing: {existing}\n  incoming: {incoming}"
    )]
    DataIntegrity {
        table: String,
        id: String,
        existing: String,
        incoming: String,
    },

    /// A record could not be converted into its typed shape.
    #[error("Invalid {table} record: {message}")]
    InvalidRecord { table: String, message: String },

    /// No configured index produced any usable data.
    #[error("No usable layer index could be loaded")]
    NoIndexes,

    /// One or more requested selectors matched nothing.
    #[error("Unable to resolve {} requested item(s):{}", items.len(), join_lines(items))]
    UnresolvedSelectors { items: Vec<UnresolvedSelector> },

    /// The closure pulled in layers from groups that need explicit selection.
    #[error("The following layer(s) need explicit selection:{}", join_group_layers(layers))]
    UnauthorizedGroupLayers { layers: Vec<GroupLayer> },

    /// An external command exited with an unexpected status.
    #[error("Command \"{command}\" returned {status} (expected {expected}){}", if output.is_empty() { String::new() } else { format!("\n{}", output) })]
    Command {
        command: String,
        status: i32,
        expected: i32,
        output: String,
    },

    /// The generated repo manifest could not be processed.
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    /// An error occurred during serialization.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A regex compilation error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Whether this error means an index source could not be reached.
    ///
    /// Such failures degrade to the on-disk cache (or drop the index) instead
    /// of aborting the run.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::TransientNetwork { .. } | Error::SourceNotFound { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let error = Error::Config {
            message: "Unable to determine base url".to_string(),
            hint: None,
        };
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("Unable to determine base url"));
        assert!(!display.contains("hint:"));
    }

    #[test]
    fn test_error_display_config_with_hint() {
        let error = Error::Config {
            message: "Unable to determine base branch".to_string(),
            hint: Some("Pass --base-branch or set OE_BASEBRANCH".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("hint:"));
        assert!(display.contains("OE_BASEBRANCH"));
    }

    #[test]
    fn test_error_display_unknown_source_type() {
        let error = Error::UnknownSourceType {
            kind: "ftp".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Unknown index type 'ftp'"));
        assert!(display.contains("restapi-web"));
    }

    #[test]
    fn test_error_display_data_integrity_reports_both_values() {
        let error = Error::DataIntegrity {
            table: "layerItems".to_string(),
            id: "7".to_string(),
            existing: r#"{"name":"meta-a"}"#.to_string(),
            incoming: r#"{"name":"meta-b"}"#.to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("layerItems id 7"));
        assert!(display.contains("meta-a"));
        assert!(display.contains("meta-b"));
    }

    #[test]
    fn test_error_display_unresolved_selectors_lists_every_item() {
        let error = Error::UnresolvedSelectors {
            items: vec![
                UnresolvedSelector {
                    kind: "layer".to_string(),
                    value: "meta-nope".to_string(),
                    close_matches: vec!["meta-node".to_string()],
                },
                UnresolvedSelector {
                    kind: "machine".to_string(),
                    value: "qemux87".to_string(),
                    close_matches: vec![],
                },
            ],
        };
        let display = format!("{}", error);
        assert!(display.contains("2 requested item(s)"));
        assert!(display.contains("layer \"meta-nope\" not found (close matches: meta-node)"));
        assert!(display.contains("machine \"qemux87\" not found"));
    }

    #[test]
    fn test_error_display_unauthorized_group_layers() {
        let error = Error::UnauthorizedGroupLayers {
            layers: vec![GroupLayer {
                layer: "meta-secure-bsp".to_string(),
                group: "bsp".to_string(),
            }],
        };
        let display = format!("{}", error);
        assert!(display.contains("need explicit selection"));
        assert!(display.contains("meta-secure-bsp (enable with --enable-group bsp)"));
    }

    #[test]
    fn test_error_display_command() {
        let error = Error::Command {
            command: "repo sync -j 4".to_string(),
            status: 1,
            expected: 0,
            output: "fatal: not a repo".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("repo sync -j 4"));
        assert!(display.contains("returned 1"));
        assert!(display.contains("fatal: not a repo"));
    }

    #[test]
    fn test_source_unavailable_classification() {
        let unreachable = Error::TransientNetwork {
            url: "http://layers.example.com/api/".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(unreachable.is_source_unavailable());

        let missing = Error::SourceNotFound {
            description: "Local".to_string(),
            path: "/nonexistent".to_string(),
        };
        assert!(missing.is_source_unavailable());

        let integrity = Error::DataIntegrity {
            table: "branches".to_string(),
            id: "1".to_string(),
            existing: "{}".to_string(),
            incoming: "{}".to_string(),
        };
        assert!(!integrity.is_source_unavailable());
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{unclosed").unwrap_err();
        let error: Error = json_error.into();
        assert!(format!("{}", error).contains("JSON parsing error"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: [unclosed").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(format!("{}", error).contains("YAML parsing error"));
    }
}
