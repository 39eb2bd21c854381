//! Loader for flat database exports (`export`).
//!
//! An export is a JSON list of `{"model": "layerindex.<name>", "pk": .., "fields": {..}}`
//! records. Only `layerindex.*` models are kept; everything else is
//! administrative data.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use serde_json::Value;

use super::{json_files, IndexSource};
use crate::error::{Error, Result};
use crate::index::{merge::merge_table, table, IndexConfig, IndexDocument};

/// Model name prefix of layer index records.
pub const MODEL_PREFIX: &str = "layerindex.";

const MODEL_TABLES: &[(&str, &str)] = &[
    ("branch", table::BRANCHES),
    ("layeritem", table::LAYER_ITEMS),
    ("layerbranch", table::LAYER_BRANCHES),
    ("layerdependency", table::LAYER_DEPENDENCIES),
    ("recipe", table::RECIPES),
    ("machine", table::MACHINES),
    ("distro", table::DISTROS),
    ("wrtemplate", table::TEMPLATES),
];

/// Table name for a model suffix (`layeritem` -> `layerItems`).
pub fn table_for_model(model: &str) -> String {
    MODEL_TABLES
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, t)| t.to_string())
        .unwrap_or_else(|| model.to_string())
}

/// Full model name for a table (`layerItems` -> `layerindex.layeritem`).
pub fn model_for_table(table_name: &str) -> String {
    let suffix = MODEL_TABLES
        .iter()
        .find(|(_, t)| *t == table_name)
        .map(|(m, _)| *m)
        .unwrap_or(table_name);
    format!("{}{}", MODEL_PREFIX, suffix)
}

/// Reshape one export file into index tables.
fn reshape(path: &Path, entries: Value) -> Result<BTreeMap<String, Vec<Value>>> {
    let Value::Array(entries) = entries else {
        return Err(Error::InvalidRecord {
            table: path.display().to_string(),
            message: "expected a list of {model, pk, fields} records".to_string(),
        });
    };

    let mut tables: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for entry in entries {
        let Some(model) = entry.get("model").and_then(Value::as_str) else {
            continue;
        };
        let Some(suffix) = model.strip_prefix(MODEL_PREFIX) else {
            continue;
        };

        let mut record = match entry.get("fields") {
            Some(Value::Object(fields)) => fields.clone(),
            _ => {
                return Err(Error::InvalidRecord {
                    table: model.to_string(),
                    message: format!("record without fields: {}", entry),
                })
            }
        };
        record.insert(
            "id".to_string(),
            entry.get("pk").cloned().unwrap_or(Value::Null),
        );

        tables
            .entry(table_for_model(suffix))
            .or_default()
            .push(Value::Object(record));
    }
    Ok(tables)
}

pub struct ExportSource;

impl ExportSource {
    pub fn load_path(description: &str, path: &Path) -> Result<IndexDocument> {
        if !path.exists() {
            return Err(Error::SourceNotFound {
                description: description.to_string(),
                path: path.display().to_string(),
            });
        }

        info!("Loading {} from path {}...", description, path.display());
        let mut document = IndexDocument::default();
        for file in json_files(path, &[])? {
            debug!("Loading json file {}", file.display());
            let content = std::fs::read_to_string(&file)?;
            let entries: Value = serde_json::from_str(&content)?;
            for (name, records) in reshape(&file, entries)? {
                let existing = document.tables.entry(name.clone()).or_default();
                merge_table(&name, existing, records)?;
            }
        }
        Ok(document)
    }
}

impl IndexSource for ExportSource {
    fn load(&self, config: &IndexConfig, _branch: Option<&str>) -> Result<IndexDocument> {
        Self::load_path(&config.description, Path::new(&config.url))
    }
}
