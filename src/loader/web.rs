//! Loader for a live layer index REST API (`restapi-web`).

use std::time::Duration;

use log::{debug, error, info};
use serde_json::{json, Map, Value};

use super::IndexSource;
use crate::error::{Error, Result};
use crate::index::{table, IndexConfig, IndexDocument};

/// Trait for HTTP client operations.
///
/// This abstraction allows the REST loader to be tested with canned
/// responses.
pub trait HttpClient {
    /// Performs an HTTP GET request and returns the response body.
    ///
    /// Connection-level failures worth retrying are reported as
    /// [`Error::TransientNetwork`].
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with a 30 second timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(30)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Network {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        source = inner.source();
    }
    false
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_connect() || is_connection_reset(&e) {
                Error::TransientNetwork {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            } else {
                Error::Network {
                    url: url.to_string(),
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(Error::Network {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| Error::Network {
                url: url.to_string(),
                message: format!("Failed to read response: {}", e),
            })
    }
}

/// Fetches an index table by table from the API root links.
pub struct WebSource<'a> {
    client: &'a dyn HttpClient,
}

/// Endpoint (as named in the API root links), table name and the filter
/// field used to restrict it to a branch.
const ENDPOINTS: &[(&str, &str, Option<&str>)] = &[
    ("layerItems", table::LAYER_ITEMS, None),
    (
        "layerDependencies",
        table::LAYER_DEPENDENCIES,
        Some("layerbranch__branch__name"),
    ),
    ("machines", table::MACHINES, Some("layerbranch__branch__name")),
    ("recipes", table::RECIPES, Some("layerbranch__branch__name")),
];

/// Endpoints not every index provides.
const OPTIONAL_ENDPOINTS: &[(&str, &str, Option<&str>)] = &[
    ("distros", table::DISTROS, Some("layerbranch__branch__name")),
    ("wrtemplates", table::TEMPLATES, Some("layerbranch__branch__name")),
    ("yPCompatibleVersions", "YPCompatibleVersions", None),
];

impl<'a> WebSource<'a> {
    pub fn new(client: &'a dyn HttpClient) -> Self {
        Self { client }
    }

    /// GET and parse a JSON document, retrying once on a transient failure.
    fn fetch_json(&self, url: &str) -> Result<Value> {
        debug!("Fetching {}...", url);
        let body = match self.client.get(url) {
            Err(Error::TransientNetwork { message, .. }) => {
                info!("Retrying {} after: {}", url, message);
                self.client.get(url)?
            }
            other => other?,
        };
        serde_json::from_slice(&body).map_err(|e| Error::Network {
            url: url.to_string(),
            message: format!("invalid JSON response: {}", e),
        })
    }

    fn fetch_table(&self, url: &str, filter: Option<&str>, branch: Option<&str>) -> Result<Vec<Value>> {
        let url = match (filter, branch) {
            (Some(field), Some(branch)) => format!("{}?filter={}:{}", url, field, branch),
            _ => url.to_string(),
        };
        match self.fetch_json(&url)? {
            Value::Array(records) => Ok(records),
            other => Err(Error::Network {
                url,
                message: format!("expected a JSON list, got {}", other),
            }),
        }
    }
}

fn link<'v>(links: &'v Map<String, Value>, name: &str) -> Option<&'v str> {
    links.get(name).and_then(Value::as_str)
}

fn id_of(record: &Value) -> Option<u64> {
    record.get("id").and_then(Value::as_u64)
}

/// One `nodistro` distro per branch, on that branch's openembedded-core.
fn synthesize_nodistro(document: &IndexDocument) -> Vec<Value> {
    let empty = Vec::new();
    let tables = &document.tables;
    let items = tables.get(table::LAYER_ITEMS).unwrap_or(&empty);
    let layer_branches = tables.get(table::LAYER_BRANCHES).unwrap_or(&empty);
    let branches = tables.get(table::BRANCHES).unwrap_or(&empty);

    let core_ids: Vec<u64> = items
        .iter()
        .filter(|item| item.get("name").and_then(Value::as_str) == Some("openembedded-core"))
        .filter_map(id_of)
        .collect();

    let mut distros = Vec::new();
    for branch in branches.iter().filter_map(id_of) {
        for lb in layer_branches.iter().filter(|lb| {
            lb.get("branch").and_then(Value::as_u64) == Some(branch)
                && lb
                    .get("layer")
                    .and_then(Value::as_u64)
                    .is_some_and(|layer| core_ids.contains(&layer))
        }) {
            distros.push(json!({
                "id": distros.len() + 1,
                "name": "nodistro",
                "description": "default",
                "updated": "2016-01-01T00:00:00+0000",
                "layerbranch": lb.get("id").cloned().unwrap_or(Value::Null),
            }));
        }
    }
    distros
}

impl IndexSource for WebSource<'_> {
    fn load(&self, config: &IndexConfig, branch: Option<&str>) -> Result<IndexDocument> {
        let links = match self.fetch_json(&config.url) {
            Ok(Value::Object(links)) => links,
            Ok(other) => {
                return Err(Error::Network {
                    url: config.url.clone(),
                    message: format!("expected the API root links, got {}", other),
                })
            }
            Err(e) => {
                if let Ok(proxy) = std::env::var("http_proxy") {
                    error!("Using proxy {}", proxy);
                }
                return Err(e);
            }
        };

        let mut document = IndexDocument {
            apilinks: Some(Value::Object(links.clone())),
            ..Default::default()
        };

        let required_link = |name: &str| {
            link(&links, name).ok_or_else(|| Error::Network {
                url: config.url.clone(),
                message: format!("API root has no '{}' link", name),
            })
        };

        let branches = self.fetch_table(required_link("branches")?, Some("name"), branch)?;
        if branches.is_empty() {
            info!("No valid branches ({}) found at url {}.", branch.unwrap_or(""), config.url);
            document.tables.insert(table::BRANCHES.to_string(), branches);
            return Ok(document);
        }
        document.tables.insert(table::BRANCHES.to_string(), branches);

        let layer_branches =
            self.fetch_table(required_link("layerBranches")?, Some("branch__name"), branch)?;
        if layer_branches.is_empty() {
            info!("No layers on branches ({}) found at url {}.", branch.unwrap_or(""), config.url);
            return Ok(document);
        }
        document
            .tables
            .insert(table::LAYER_BRANCHES.to_string(), layer_branches);

        for (endpoint, name, filter) in ENDPOINTS {
            let records = self.fetch_table(required_link(endpoint)?, *filter, branch)?;
            document.tables.insert(name.to_string(), records);
        }

        for (endpoint, name, filter) in OPTIONAL_ENDPOINTS {
            if let Some(url) = link(&links, endpoint) {
                let records = self.fetch_table(url, *filter, branch)?;
                document.tables.insert(name.to_string(), records);
            }
        }

        if !document.tables.contains_key(table::DISTROS) {
            let distros = synthesize_nodistro(&document);
            document.tables.insert(table::DISTROS.to_string(), distros);
        }

        Ok(document)
    }
}
