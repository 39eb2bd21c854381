//! # wrlinux-setup Library
//!
//! This library assembles a multi-repository Yocto/OpenEmbedded project
//! checkout. It is used by the `wrlinux-setup` command-line tool, but the
//! resolution engine can be driven directly by other applications.
//!
//! ## Quick Example
//!
//! ```
//! use wrlinux_setup::resolver::Remotes;
//! use wrlinux_setup::settings::Settings;
//!
//! let settings = Settings::parse("repo_jobs: 8").unwrap();
//! assert_eq!(settings.repo_jobs, 8);
//! assert_eq!(settings.base_layers, vec!["wr-base", "wr-fixes"]);
//!
//! let remotes = Remotes::compute(
//!     "git://git.example.com/wrlinux",
//!     &settings.remotes,
//!     [
//!         "git://git.example.com/wrlinux/wr-base",
//!         "git://git.openembedded.org/openembedded-core",
//!     ],
//! );
//! let (remote, path) = remotes
//!     .relative_url("git://git.openembedded.org/openembedded-core")
//!     .unwrap();
//! assert_eq!(remote.name, "openembedded");
//! assert_eq!(path, "openembedded-core");
//! ```
//!
//! ## Core Concepts
//!
//! - **Indexes (`index`)**: the layer index data model. An index is a set
//!   of tables (branches, layers, layer-branches, dependencies, machines,
//!   distros, recipes, templates) with typed accessors in `index::query`.
//! - **Loading (`loader`)**: REST API, flat file and export sources, the
//!   mirror snapshot, URL substitution and the on-disk cache.
//! - **Resolution (`resolver`)**: the breadth-first closure over required
//!   and recommended dependencies across priority-ordered indexes, and the
//!   repo remotes covering the result.
//! - **Serialization (`serialize`)**: REST API and export shapes, split or
//!   monolithic, optionally rewritten for a mirror.
//! - **Project emission (`manifest`, `project`, `sync`)**: `default.xml`,
//!   the sample configuration files, `.gitignore`, and the `git`/`repo`
//!   steps behind a mockable command runner.
//!
//! ## Execution Flow
//!
//! 1. Read [`settings::Settings`] and build the substitution list.
//! 2. Load every configured index with [`loader::IndexLoader`].
//! 3. Resolve the selection with [`resolver::Resolver`].
//! 4. Compute [`resolver::Remotes`] and render the manifest.
//! 5. Write the project files, commit them and sync.

pub mod defaults;
pub mod error;
pub mod index;
pub mod loader;
pub mod manifest;
pub mod output;
pub mod project;
pub mod resolver;
pub mod serialize;
pub mod settings;
pub mod suggestions;
pub mod sync;

#[cfg(test)]
mod resolver_proptest;
