//! # Index Serialization
//!
//! Renders an [`Index`] to disk in one of two shapes:
//!
//! - **REST API** (`Format::RestApi`): `{table: [records]}`, the shape the
//!   `restapi-files` loader reads back. Object keys are sorted and every
//!   table is sorted by `id`, so re-serializing unchanged data produces
//!   identical bytes.
//! - **Flat export** (`Format::Export`): `[{pk, model, fields}]`, the shape
//!   of a database dump, read back by the `export` loader.
//!
//! Output is either one file `<base>.json` or, when splitting, one file per
//! layer-branch named `<base>__<branch>__<layer>.json`. Each split file is
//! self-contained: it carries the layer-branch's required-dependency closure
//! together with the matching branch and layer records.
//!
//! In mirror mode every layer's `vcs_url` has its `scheme://host` replaced
//! with the `#BASE_URL#` token, and the `CFG` entry is kept so the files can
//! be loaded as a mirror snapshot.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use url::{Position, Url};

use crate::error::{Error, Result};
use crate::index::{table, Index};
use crate::loader::export::model_for_table;

/// Token standing in for the scheme and host of mirrored URLs.
pub const BASE_URL_TOKEN: &str = "#BASE_URL#";

/// On-disk shape of a serialized index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    RestApi,
    Export,
}

#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    pub format: Format,
    /// One file per layer-branch instead of one file per index.
    pub split: bool,
    /// Rewrite layer URLs to `#BASE_URL#` and keep `CFG`.
    pub mirror: bool,
    /// Keep the `CFG` and `apilinks` entries (REST API shape only).
    pub include_bookkeeping: bool,
}

/// Replace `/` and space with `_`.
pub fn sanitize(name: &str) -> String {
    name.replace(['/', ' '], "_")
}

fn with_sanitized_name(base: &Path, name: &str) -> PathBuf {
    let file = format!("{}.json", sanitize(name));
    match base.parent() {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}

fn base_name(base: &Path) -> String {
    base.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<base>.json`, with the base name sanitized.
pub fn monolithic_path(base: &Path) -> PathBuf {
    with_sanitized_name(base, &base_name(base))
}

/// `<base>__<branch>__<layer>.json`, sanitized.
pub fn split_path(base: &Path, branch: &str, layer: &str) -> PathBuf {
    with_sanitized_name(base, &format!("{}__{}__{}", base_name(base), branch, layer))
}

/// Replace the `scheme://host` part of a URL with [`BASE_URL_TOKEN`].
///
/// URLs without a host (local paths) are returned unchanged.
pub fn mirror_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            format!("{}{}", BASE_URL_TOKEN, &parsed[Position::BeforePath..])
        }
        _ => url.to_string(),
    }
}

fn sort_key(record: &Value) -> (u64, String) {
    match record.get("id") {
        Some(Value::Number(n)) => (n.as_u64().unwrap_or(u64::MAX), String::new()),
        Some(other) => (u64::MAX, other.to_string()),
        None => (u64::MAX, String::new()),
    }
}

/// Sort records by `id`.
pub fn sort_records(records: &mut [Value]) {
    records.sort_by_key(sort_key);
}

/// Rebuild every object with its keys in sorted order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::Serialization {
            message: format!("{}: {}", path.display(), e),
        })?;
    fs::write(path, out)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// The index's tables, sorted, with mirror rewriting applied.
fn prepared_tables(index: &Index, mirror: bool) -> Result<BTreeMap<String, Vec<Value>>> {
    let mut tables = index.tables()?;
    for records in tables.values_mut() {
        sort_records(records);
    }
    if mirror {
        if let Some(layers) = tables.get_mut(table::LAYER_ITEMS) {
            for layer in layers.iter_mut() {
                if let Some(Value::String(url)) = layer.get_mut("vcs_url") {
                    *url = mirror_url(url);
                }
            }
        }
    }
    Ok(tables)
}

/// REST API shaped value of a set of tables.
pub fn rest_api_value(
    tables: BTreeMap<String, Vec<Value>>,
    bookkeeping: Option<&Index>,
) -> Result<Value> {
    let mut object = Map::new();
    for (name, records) in tables {
        object.insert(name, Value::Array(records));
    }
    if let Some(index) = bookkeeping {
        object.insert(
            table::CONFIG.to_string(),
            serde_json::to_value(&index.config)?,
        );
        if let Some(links) = &index.apilinks {
            object.insert(table::API_LINKS.to_string(), links.clone());
        }
    }
    Ok(sort_keys(Value::Object(object)))
}

#[derive(Debug, Serialize)]
struct ExportRecord {
    pk: Value,
    model: String,
    fields: Value,
}

/// Flat export records for a set of tables.
fn export_records(tables: BTreeMap<String, Vec<Value>>) -> Vec<ExportRecord> {
    let has_python_environment = tables.contains_key("pythonenvironment");
    let mut records = Vec::new();

    for (name, rows) in tables {
        let model = model_for_table(&name);
        for row in rows {
            let Value::Object(mut fields) = row else {
                continue;
            };
            let pk = fields.remove("id").unwrap_or(Value::Null);
            if name == table::BRANCHES
                && !has_python_environment
                && fields.contains_key("update_environment")
            {
                fields.insert("update_environment".to_string(), Value::Null);
            }
            records.push(ExportRecord {
                pk,
                model: model.clone(),
                fields: sort_keys(Value::Object(fields)),
            });
        }
    }
    records
}

fn write_tables(
    index: &Index,
    tables: BTreeMap<String, Vec<Value>>,
    path: &Path,
    options: &SerializeOptions,
) -> Result<()> {
    match options.format {
        Format::RestApi => {
            let bookkeeping = (options.include_bookkeeping || options.mirror).then_some(index);
            write_json(path, &rest_api_value(tables, bookkeeping)?)
        }
        Format::Export => write_json(path, &export_records(tables)),
    }
}

/// Layer-branch ids of `start` and its required-dependency closure.
fn required_closure(index: &Index, start: u64) -> Vec<u64> {
    let mut seen = vec![start];
    let mut queue = VecDeque::from([start]);
    while let Some(id) = queue.pop_front() {
        let Some(lb) = index.layer_branch(id) else {
            continue;
        };
        let (required, _) = index.dependencies(lb);
        for dep in required {
            if !seen.contains(&dep.id) {
                seen.push(dep.id);
                queue.push_back(dep.id);
            }
        }
    }
    seen
}

/// Tables restricted to one layer-branch partition.
fn partition_tables(
    tables: &BTreeMap<String, Vec<Value>>,
    layer_branches: &BTreeSet<u64>,
    layers: &BTreeSet<u64>,
    branches: &BTreeSet<u64>,
) -> BTreeMap<String, Vec<Value>> {
    let id_in = |record: &Value, key: &str, set: &BTreeSet<u64>| {
        record
            .get(key)
            .and_then(Value::as_u64)
            .is_some_and(|id| set.contains(&id))
    };

    tables
        .iter()
        .map(|(name, records)| {
            let kept: Vec<Value> = records
                .iter()
                .filter(|record| match name.as_str() {
                    table::BRANCHES => id_in(record, "id", branches),
                    table::LAYER_BRANCHES => id_in(record, "id", layer_branches),
                    table::LAYER_ITEMS => id_in(record, "id", layers),
                    _ if record.get("layerbranch").is_some() => {
                        id_in(record, "layerbranch", layer_branches)
                    }
                    _ if record.get("layer").is_some() => id_in(record, "layer", layers),
                    _ => true,
                })
                .cloned()
                .collect();
            (name.clone(), kept)
        })
        .collect()
}

/// Serialize an index below `base` and return the files written.
pub fn write_index(index: &Index, base: &Path, options: &SerializeOptions) -> Result<Vec<PathBuf>> {
    let tables = prepared_tables(index, options.mirror)?;

    if !options.split {
        let path = monolithic_path(base);
        write_tables(index, tables, &path, options)?;
        return Ok(vec![path]);
    }

    let mut written = Vec::new();
    for lb in &index.layer_branches {
        let (Some(branch), Some(layer)) = (index.branch(lb.branch), index.layer_of(lb)) else {
            warn!(
                "{}: layer-branch {} has no branch or layer record, not serialized",
                index.description(),
                lb.id
            );
            continue;
        };

        let closure: BTreeSet<u64> = required_closure(index, lb.id).into_iter().collect();
        let members: Vec<_> = closure.iter().filter_map(|id| index.layer_branch(*id)).collect();
        let layers: BTreeSet<u64> = members.iter().map(|m| m.layer).collect();
        let branches: BTreeSet<u64> = members.iter().map(|m| m.branch).collect();

        let partition = partition_tables(&tables, &closure, &layers, &branches);
        let path = split_path(base, &branch.name, &layer.name);
        write_tables(index, partition, &path, options)?;
        written.push(path);
    }
    Ok(written)
}

/// Write the post-substitution cache copy of an index (REST API shape, no
/// bookkeeping) to exactly `path`.
pub fn write_cache(index: &Index, path: &Path) -> Result<()> {
    let tables = prepared_tables(index, false)?;
    write_json(path, &rest_api_value(tables, None)?)
}
