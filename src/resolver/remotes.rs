//! Repo remotes for a set of layer URLs.
//!
//! Remotes are kept in registration order: `base` first, then one remote per
//! URL that no earlier remote covers. Looking a URL up returns the first
//! remote whose fetch URL is a prefix of it.

use log::debug;
use url::{Position, Url};

/// Name of the remote pointing at the installer's own git server.
pub const BASE_REMOTE: &str = "base";
/// Name of the remote registered for schemeless (local path) URLs.
pub const LOCAL_REMOTE: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub fetch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remotes {
    entries: Vec<Remote>,
}

impl Remotes {
    /// Remotes holding only `base`.
    pub fn new(base_url: &str) -> Self {
        Self {
            entries: vec![Remote {
                name: BASE_REMOTE.to_string(),
                fetch: base_url.to_string(),
            }],
        }
    }

    /// Register remotes for every URL, in order.
    ///
    /// `known` is the configured `(url prefix, name)` list.
    pub fn compute<'a, I>(base_url: &str, known: &[(String, String)], urls: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut remotes = Self::new(base_url);
        for url in urls {
            remotes.add_url(url, known);
        }
        remotes
    }

    fn register(&mut self, name: String, fetch: String) {
        debug!("Adding remote {} -> {}", name, fetch);
        match self.entries.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.fetch = fetch,
            None => self.entries.push(Remote { name, fetch }),
        }
    }

    /// Make sure some remote covers `url`.
    pub fn add_url(&mut self, url: &str, known: &[(String, String)]) {
        if self.lookup(url).is_some() {
            return;
        }

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => {
                self.register(LOCAL_REMOTE.to_string(), "/".to_string());
                return;
            }
        };

        if let Some((prefix, name)) = known.iter().find(|(prefix, _)| url.starts_with(prefix.as_str())) {
            self.register(name.clone(), prefix.clone());
            return;
        }

        let netloc = &parsed[Position::BeforeUsername..Position::AfterPort];
        let name = format!("{}_{}", parsed.scheme(), netloc.replace(['/', ':'], "_"));
        self.register(name, format!("{}://{}", parsed.scheme(), netloc));
    }

    /// The first remote whose fetch URL is a prefix of `url`.
    pub fn lookup(&self, url: &str) -> Option<&Remote> {
        self.entries.iter().find(|r| url.starts_with(r.fetch.as_str()))
    }

    /// `url` relative to its remote, without leading or trailing `/`.
    pub fn relative_url<'u>(&self, url: &'u str) -> Option<(&Remote, &'u str)> {
        self.lookup(url)
            .map(|remote| (remote, url[remote.fetch.len()..].trim_matches('/')))
    }

    pub fn base(&self) -> &Remote {
        &self.entries[0]
    }

    /// All remotes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Remote> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
