//! # Index Loading
//!
//! This module turns a priority-ordered list of [`IndexConfig`] entries into
//! normalized [`Index`] values.
//!
//! ## Sources
//!
//! Each configured `type` maps to one [`IndexSource`] implementation:
//!
//! - [`web::WebSource`] for `restapi-web`
//! - [`files::FilesSource`] for `restapi-files`
//! - [`export::ExportSource`] for `export`
//!
//! A mirror directory ([`mirror`]) is consulted first: an entry whose
//! description matches a mirrored index never touches its source.
//!
//! ## Load pipeline
//!
//! For every configuration entry, in order:
//!
//! 1. Apply the `(find, replace)` substitutions to the URL and branch.
//! 2. Take the mirror copy, or load from the source. An unreachable source
//!    falls back to `<cache>.json`; without a cache the entry is dropped.
//! 3. Validate into an [`Index`], dropping it when it has no branches,
//!    layers or layer-branches.
//! 4. Normalize: `defaultsetup` becomes `nodistro`, URL substitutions are
//!    applied to every layer, `layerBranches` are sorted by id, and the
//!    effective branch is recorded in `CFG.BRANCH`.
//! 5. Write freshly loaded data to the cache, when one is configured.

pub mod export;
pub mod files;
pub mod mirror;
pub mod web;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::index::{Index, IndexConfig, IndexDocument, SourceType};
use crate::serialize;

pub use web::{HttpClient, ReqwestClient};

/// A loader for one kind of index source.
pub trait IndexSource {
    /// Load the raw document `config` describes.
    ///
    /// `branch` is the effective branch; sources that can filter server side
    /// use it. Errors for which [`Error::is_source_unavailable`] holds make
    /// the caller fall back to the cache.
    fn load(&self, config: &IndexConfig, branch: Option<&str>) -> Result<IndexDocument>;
}

/// Inputs shared by every configured index.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Branch used for indexes that do not pin one.
    pub base_branch: Option<String>,
    /// Literal `(find, replace)` pairs, applied in order.
    pub replace: Vec<(String, String)>,
    /// Directory holding previously serialized indexes.
    pub mirror: Option<PathBuf>,
    /// Directory relative cache paths are resolved against.
    pub cache_root: Option<PathBuf>,
}

/// Apply every substitution, in order, to `text`.
pub fn substitute(text: &str, replace: &[(String, String)]) -> String {
    replace
        .iter()
        .fold(text.to_string(), |acc, (find, rep)| acc.replace(find, rep))
}

/// All `.json` files below `path` (or `path` itself), in a stable order.
///
/// Directories named in `skip_dirs` are not descended into.
pub(crate) fn json_files(path: &Path, skip_dirs: &[&str]) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut found = Vec::new();
    let walker = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !skip_dirs
                    .iter()
                    .any(|skip| entry.file_name().to_str() == Some(*skip))
        });
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|ext| ext.to_str()) == Some("json")
        {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Loads indexes, dispatching each entry to its [`IndexSource`].
pub struct IndexLoader {
    http: Box<dyn HttpClient>,
}

impl IndexLoader {
    pub fn new(http: Box<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// A loader using a [`ReqwestClient`] for `restapi-web` sources.
    pub fn with_default_client() -> Result<Self> {
        Ok(Self::new(Box::new(ReqwestClient::new()?)))
    }

    fn source(&self, source_type: SourceType) -> Box<dyn IndexSource + '_> {
        match source_type {
            SourceType::RestApiWeb => Box::new(web::WebSource::new(self.http.as_ref())),
            SourceType::RestApiFiles => Box::new(files::FilesSource),
            SourceType::Export => Box::new(export::ExportSource),
        }
    }

    /// Load every configured index, in configuration order.
    ///
    /// Entries that yield no usable data are dropped with a warning. It is an
    /// error for every entry to be dropped.
    pub fn load_indexes(&self, configs: &[IndexConfig], options: &LoadOptions) -> Result<Vec<Index>> {
        let mut mirrored = match &options.mirror {
            Some(dir) => mirror::load_mirror(dir)?,
            None => BTreeMap::new(),
        };

        let mut indexes = Vec::with_capacity(configs.len());
        for config in configs {
            if let Some(index) = self.load_one(config, options, &mut mirrored)? {
                indexes.push(index);
            }
        }

        if indexes.is_empty() && !configs.is_empty() {
            return Err(Error::NoIndexes);
        }
        Ok(indexes)
    }

    fn load_one(
        &self,
        config: &IndexConfig,
        options: &LoadOptions,
        mirrored: &mut BTreeMap<String, IndexDocument>,
    ) -> Result<Option<Index>> {
        let mut config = config.clone();
        config.url = substitute(&config.url, &options.replace);
        config.branch = config
            .branch
            .as_deref()
            .map(|b| substitute(b, &options.replace))
            .or_else(|| options.base_branch.clone());

        let cache_file = config
            .cache
            .as_deref()
            .map(|cache| resolve_cache_file(cache, options.cache_root.as_deref()));

        let (document, fresh) = match mirrored.remove(&config.description) {
            Some(document) => {
                info!("Using mirrored copy of {}", config.description);
                (Some(document), false)
            }
            None => {
                info!("Loading {} from {}...", config.description, config.url);
                match self
                    .source(config.source_type)
                    .load(&config, config.branch.as_deref())
                {
                    Ok(document) => (Some(document), true),
                    Err(e) if e.is_source_unavailable() => {
                        warn!("Index {}: {}", config.description, e);
                        (None, false)
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let document = match (document, &cache_file) {
            (Some(document), _) => Some(document),
            (None, Some(path)) if path.exists() => {
                info!("Loading {} from cache {}", config.description, path.display());
                Some(files::FilesSource::load_path(&config.description, path)?)
            }
            (None, _) => None,
        };

        let Some(document) = document else {
            warn!("Index {}: no data could be loaded, skipping", config.description);
            return Ok(None);
        };

        let mut index = Index::from_document(document, config)?;
        if index.is_empty() {
            warn!(
                "Index {}: no branches, layers or layer-branches found, skipping",
                index.description()
            );
            return Ok(None);
        }

        normalize(&mut index, &options.replace);

        if let (true, Some(path)) = (fresh, &cache_file) {
            debug!("Caching {} to {}", index.description(), path.display());
            serialize::write_cache(&index, path)?;
        }

        Ok(Some(index))
    }
}

/// `<cache>.json`, relative to `cache_root` when the cache path is relative.
pub fn resolve_cache_file(cache: &str, cache_root: Option<&Path>) -> PathBuf {
    let cache = Path::new(cache);
    let base = match cache_root {
        Some(root) if cache.is_relative() => root.join(cache),
        _ => cache.to_path_buf(),
    };
    serialize::monolithic_path(&base)
}

/// Apply the load-time normalizations to a freshly validated index.
pub fn normalize(index: &mut Index, replace: &[(String, String)]) {
    for distro in index.distros.iter_mut() {
        if distro.name == "defaultsetup" {
            distro.name = "nodistro".to_string();
        }
    }

    for layer in index.layer_items.iter_mut() {
        layer.vcs_url = substitute(&layer.vcs_url, replace);
        for url in [&mut layer.vcs_web_url, &mut layer.mailing_list_url]
            .into_iter()
            .flatten()
        {
            *url = substitute(url, replace);
        }
        for (key, value) in layer.extra.iter_mut() {
            if !key.contains("url") {
                continue;
            }
            if let Value::String(text) = value {
                *text = substitute(text, replace);
            }
        }
    }

    index.layer_branches.sort_by_key(|lb| lb.id);
}
