//! # Layer Index Data Model
//!
//! This module defines the typed records that make up one layer index and the
//! two shapes an index is handled in:
//!
//! - **`IndexDocument`**: the raw, table-oriented JSON shape exactly as a
//!   source delivered it (`{"branches": [...], "layerItems": [...], ...}`,
//!   plus the `CFG` and `apilinks` bookkeeping entries). Identity merging of
//!   partial sources happens on this shape, see [`merge`].
//!
//! - **`Index`**: the validated form. Every known table is converted into a
//!   typed record (`Branch`, `LayerItem`, `LayerBranch`, ...). Required keys
//!   are checked once, here, at the load boundary. Unknown fields are kept in
//!   each record's `extra` map and unknown tables are kept verbatim in
//!   `extra_tables`, so serializing an `Index` loses nothing it was built from.
//!
//! Read-only lookups over an `Index` live in [`query`].

pub mod merge;
pub mod query;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Canonical table names of the REST-API shape.
pub mod table {
    pub const BRANCHES: &str = "branches";
    pub const LAYER_ITEMS: &str = "layerItems";
    pub const LAYER_BRANCHES: &str = "layerBranches";
    pub const LAYER_DEPENDENCIES: &str = "layerDependencies";
    pub const MACHINES: &str = "machines";
    pub const DISTROS: &str = "distros";
    pub const RECIPES: &str = "recipes";
    pub const TEMPLATES: &str = "wrtemplates";

    /// Bookkeeping entry holding the source configuration.
    pub const CONFIG: &str = "CFG";
    /// Bookkeeping entry holding the REST API root links.
    pub const API_LINKS: &str = "apilinks";
}

/// The kind of source an index is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceType {
    /// A live layer index REST API.
    RestApiWeb,
    /// Files in the REST API shape (a single file or a directory of them).
    RestApiFiles,
    /// A flat database export (`[{model, pk, fields}]`).
    Export,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::RestApiWeb => "restapi-web",
            SourceType::RestApiFiles => "restapi-files",
            SourceType::Export => "export",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "restapi-web" => Ok(SourceType::RestApiWeb),
            "restapi-files" => Ok(SourceType::RestApiFiles),
            "export" => Ok(SourceType::Export),
            other => Err(Error::UnknownSourceType {
                kind: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SourceType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SourceType> for String {
    fn from(value: SourceType) -> Self {
        value.as_str().to_string()
    }
}

/// Configuration of one index source, also stored as the index's `CFG` entry.
///
/// Upper-case keys are what serialized indexes carry; lower-case keys are
/// accepted so settings files can use the usual YAML style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(rename = "DESCRIPTION", alias = "description")]
    pub description: String,

    #[serde(rename = "TYPE", alias = "type")]
    pub source_type: SourceType,

    #[serde(rename = "URL", alias = "url", default)]
    pub url: String,

    /// Cache path without the `.json` suffix.
    #[serde(
        rename = "CACHE",
        alias = "cache",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cache: Option<String>,

    /// Branch this index is pinned to. After loading this always holds the
    /// effective branch (configured, else the base branch).
    #[serde(
        rename = "BRANCH",
        alias = "branch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub branch: Option<String>,
}

impl IndexConfig {
    pub fn new(
        description: impl Into<String>,
        source_type: SourceType,
        url: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            source_type,
            url: url.into(),
            cache: None,
            branch: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub bitbake_branch: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerItem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub vcs_url: String,
    #[serde(default)]
    pub vcs_web_url: Option<String>,
    #[serde(default)]
    pub mailing_list_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBranch {
    pub id: u64,
    /// `LayerItem.id` this binding belongs to.
    pub layer: u64,
    /// `Branch.id` this binding belongs to.
    pub branch: u64,
    #[serde(default)]
    pub collection: Option<String>,
    /// Revision override; the branch name is used when absent or empty.
    #[serde(default)]
    pub actual_branch: Option<String>,
    #[serde(default)]
    pub vcs_subdir: String,
    #[serde(default)]
    pub yp_compatible_version: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerBranch {
    /// The collection name, treating an empty string as absent.
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref().filter(|c| !c.is_empty())
    }

    /// The revision override, treating an empty string as absent.
    pub fn actual_branch_name(&self) -> Option<&str> {
        self.actual_branch.as_deref().filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDependency {
    pub id: u64,
    /// `LayerBranch.id` that declares the dependency.
    pub layerbranch: u64,
    /// `LayerItem.id` that is depended upon.
    pub dependency: u64,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub layerbranch: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distro {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub layerbranch: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: u64,
    pub pn: String,
    #[serde(default)]
    pub pv: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub layerbranch: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A project template (`wrtemplates` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub layerbranch: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An index as delivered by a source: untyped tables plus bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDocument {
    /// Raw `CFG` entry, if the document carried one.
    pub config: Option<Value>,
    /// Raw `apilinks` entry, if the document carried one.
    pub apilinks: Option<Value>,
    pub tables: BTreeMap<String, Vec<Value>>,
}

impl IndexDocument {
    /// Build a document from a parsed JSON object.
    ///
    /// Every entry other than `CFG` and `apilinks` must be an array of
    /// records.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(Error::InvalidRecord {
                table: "<document>".to_string(),
                message: "expected a JSON object of tables".to_string(),
            });
        };

        let mut document = IndexDocument::default();
        for (key, entry) in entries {
            match key.as_str() {
                table::CONFIG => document.config = Some(entry),
                table::API_LINKS => document.apilinks = Some(entry),
                _ => match entry {
                    Value::Array(records) => {
                        document.tables.insert(key, records);
                    }
                    other => {
                        return Err(Error::InvalidRecord {
                            table: key,
                            message: format!("expected an array of records, found {}", other),
                        })
                    }
                },
            }
        }
        Ok(document)
    }

    /// Read and parse one JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(value)
    }

    /// The `DESCRIPTION` of the embedded `CFG` entry.
    pub fn description(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|cfg| cfg.get("DESCRIPTION"))
            .and_then(Value::as_str)
    }

    /// Convert back into a JSON object, optionally keeping `CFG`/`apilinks`.
    pub fn into_value(self, include_bookkeeping: bool) -> Value {
        let mut object = Map::new();
        for (name, records) in self.tables {
            object.insert(name, Value::Array(records));
        }
        if include_bookkeeping {
            if let Some(cfg) = self.config {
                object.insert(table::CONFIG.to_string(), cfg);
            }
            if let Some(links) = self.apilinks {
                object.insert(table::API_LINKS.to_string(), links);
            }
        }
        Value::Object(object)
    }
}

/// One validated layer index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub config: IndexConfig,
    pub apilinks: Option<Value>,
    pub branches: Vec<Branch>,
    pub layer_items: Vec<LayerItem>,
    pub layer_branches: Vec<LayerBranch>,
    pub layer_dependencies: Vec<LayerDependency>,
    pub machines: Vec<Machine>,
    pub distros: Vec<Distro>,
    pub recipes: Vec<Recipe>,
    pub templates: Vec<Template>,
    /// Tables without a typed representation, kept verbatim.
    pub extra_tables: BTreeMap<String, Vec<Value>>,
}

fn parse_table<T: DeserializeOwned>(name: &str, records: Vec<Value>) -> Result<Vec<T>> {
    records
        .into_iter()
        .map(|record| {
            let id = record.get("id").cloned().unwrap_or(Value::Null);
            serde_json::from_value(record).map_err(|e| Error::InvalidRecord {
                table: name.to_string(),
                message: format!("id {}: {}", id, e),
            })
        })
        .collect()
}

fn table_values<T: Serialize>(records: &[T]) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|record| serde_json::to_value(record).map_err(Error::from))
        .collect()
}

impl Index {
    /// An index with no records.
    pub fn empty(config: IndexConfig) -> Self {
        Self {
            config,
            apilinks: None,
            branches: Vec::new(),
            layer_items: Vec::new(),
            layer_branches: Vec::new(),
            layer_dependencies: Vec::new(),
            machines: Vec::new(),
            distros: Vec::new(),
            recipes: Vec::new(),
            templates: Vec::new(),
            extra_tables: BTreeMap::new(),
        }
    }

    /// Validate a raw document into typed tables.
    ///
    /// `config` becomes the index's `CFG`; whatever `CFG` the document
    /// carried is ignored.
    pub fn from_document(document: IndexDocument, config: IndexConfig) -> Result<Self> {
        let mut index = Index::empty(config);
        index.apilinks = document.apilinks;

        for (name, records) in document.tables {
            match name.as_str() {
                table::BRANCHES => index.branches = parse_table(&name, records)?,
                table::LAYER_ITEMS => index.layer_items = parse_table(&name, records)?,
                table::LAYER_BRANCHES => index.layer_branches = parse_table(&name, records)?,
                table::LAYER_DEPENDENCIES => {
                    index.layer_dependencies = parse_table(&name, records)?
                }
                table::MACHINES => index.machines = parse_table(&name, records)?,
                table::DISTROS => index.distros = parse_table(&name, records)?,
                table::RECIPES => index.recipes = parse_table(&name, records)?,
                table::TEMPLATES => index.templates = parse_table(&name, records)?,
                _ => {
                    index.extra_tables.insert(name, records);
                }
            }
        }

        Ok(index)
    }

    /// All tables as untyped JSON records, keyed by table name.
    pub fn tables(&self) -> Result<BTreeMap<String, Vec<Value>>> {
        let mut tables = self.extra_tables.clone();
        tables.insert(table::BRANCHES.to_string(), table_values(&self.branches)?);
        tables.insert(table::LAYER_ITEMS.to_string(), table_values(&self.layer_items)?);
        tables.insert(
            table::LAYER_BRANCHES.to_string(),
            table_values(&self.layer_branches)?,
        );
        tables.insert(
            table::LAYER_DEPENDENCIES.to_string(),
            table_values(&self.layer_dependencies)?,
        );
        tables.insert(table::MACHINES.to_string(), table_values(&self.machines)?);
        tables.insert(table::DISTROS.to_string(), table_values(&self.distros)?);
        tables.insert(table::RECIPES.to_string(), table_values(&self.recipes)?);
        tables.insert(table::TEMPLATES.to_string(), table_values(&self.templates)?);
        Ok(tables)
    }

    /// Convert back into the raw document shape.
    pub fn to_document(&self) -> Result<IndexDocument> {
        Ok(IndexDocument {
            config: Some(serde_json::to_value(&self.config)?),
            apilinks: self.apilinks.clone(),
            tables: self.tables()?,
        })
    }

    /// An index lacking branches, layers or layer-branches is unusable.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() || self.layer_items.is_empty() || self.layer_branches.is_empty()
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }
}
