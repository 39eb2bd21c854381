//! # Layer Resolution
//!
//! Turns a [`Selection`] (requested layers, distros, machines, recipes and
//! templates) into two ordered, dependency-closed layer lists: the layers
//! the project requires and the layers their dependencies recommend.
//!
//! ## Algorithm
//!
//! Resolution runs over two FIFO queues of `(index, layer-branch)`
//! candidates. Duplicates may be queued; they are filtered when dequeued.
//!
//! 1. **Seeding**: the base layers (from the first index only), then every
//!    selector in the order layers, distros, machines, recipes, templates
//!    (the first index with matches wins), then, with `all_layers`, every
//!    layer-branch of every index. Selectors that match nothing are
//!    collected and reported together.
//! 2. **Closure**: the required queue is drained, then the recommended
//!    queue. A candidate that an earlier-configured index also provides
//!    (same collection, else same layer name) is replaced by that index's
//!    copy. A candidate whose collection or name was already accepted is
//!    dropped. Accepted candidates queue their dependencies.
//! 3. **Filtering**: layers belonging to an extra group that was not
//!    enabled are rejected unless they were requested explicitly or are a
//!    dependency of something that was. With `no_recommend` the
//!    recommended list is emptied (download layers survive with
//!    `dl_layers`).
//!
//! All mutable state lives in a [`ResolutionState`] owned by one
//! [`Resolver::resolve`] call.

pub mod remotes;

use std::collections::{HashSet, VecDeque};

use glob::Pattern;
use log::{debug, info};
use regex::Regex;

use crate::error::{Error, GroupLayer, Result, UnresolvedSelector};
use crate::index::query::{Lookup, SelectorKind};
use crate::index::{Index, LayerBranch};
use crate::settings::Settings;
use crate::suggestions::CLOSE_MATCH_LIMIT;

pub use remotes::{Remote, Remotes};

/// What the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub layers: Vec<String>,
    pub distros: Vec<String>,
    pub machines: Vec<String>,
    pub recipes: Vec<String>,
    pub templates: Vec<String>,
    /// Seed every layer of every index.
    pub all_layers: bool,
    /// Keep download layers among the recommendations.
    pub dl_layers: bool,
    /// Drop recommendations.
    pub no_recommend: bool,
    /// Keys of extra groups whose layers may be pulled in.
    pub enabled_groups: Vec<String>,
}

impl Selection {
    fn selectors(&self) -> impl Iterator<Item = (SelectorKind, &str)> {
        let kinds = [
            (SelectorKind::Layer, &self.layers),
            (SelectorKind::Distro, &self.distros),
            (SelectorKind::Machine, &self.machines),
            (SelectorKind::Recipe, &self.recipes),
            (SelectorKind::Template, &self.templates),
        ];
        kinds
            .into_iter()
            .flat_map(|(kind, values)| values.iter().map(move |v| (kind, v.as_str())))
    }
}

/// A layer chosen for the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLayer {
    /// Position of the providing index in the configured list.
    pub index: usize,
    pub layer_branch_id: u64,
    pub branch_id: u64,
    pub name: String,
    pub collection: Option<String>,
    pub vcs_url: String,
    pub vcs_subdir: String,
    /// `actual_branch` when set, else the active branch name.
    pub revision: String,
    pub bitbake_branch: Option<String>,
}

impl ResolvedLayer {
    /// Checkout path of the layer's repository, `layers/<repository>`.
    pub fn repository_path(&self) -> String {
        let repository = self.vcs_url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        format!("layers/{}", repository)
    }

    /// Path of the layer itself, including its subdirectory.
    pub fn layer_path(&self) -> String {
        if self.vcs_subdir.is_empty() {
            self.repository_path()
        } else {
            format!("{}/{}", self.repository_path(), self.vcs_subdir)
        }
    }
}

/// The result of one resolution pass, in acceptance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub required: Vec<ResolvedLayer>,
    pub recommended: Vec<ResolvedLayer>,
}

impl Resolution {
    /// Required layers followed by recommended layers.
    pub fn layers(&self) -> impl Iterator<Item = &ResolvedLayer> {
        self.required.iter().chain(self.recommended.iter())
    }
}

/// How a candidate entered the queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    /// Base layers, selectors and their dependencies.
    Explicit,
    /// Seeded by `all_layers`.
    AllLayers,
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    index: usize,
    layer_branch: &'a LayerBranch,
    provenance: Provenance,
}

#[derive(Debug)]
struct Accepted<'a> {
    candidate: Candidate<'a>,
    name: String,
    collection: Option<String>,
}

impl Accepted<'_> {
    fn matches(&self, collection: Option<&str>, name: &str) -> bool {
        (collection.is_some() && self.collection.as_deref() == collection) || self.name == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Required,
    Recommended,
}

#[derive(Debug, Default)]
struct ResolutionState<'a> {
    required_queue: VecDeque<Candidate<'a>>,
    recommended_queue: VecDeque<Candidate<'a>>,
    seen_collections: HashSet<String>,
    seen_names: HashSet<String>,
    required: Vec<Accepted<'a>>,
    recommended: Vec<Accepted<'a>>,
    unresolved: Vec<UnresolvedSelector>,
}

impl<'a> ResolutionState<'a> {
    fn queue(&mut self, phase: Phase) -> &mut VecDeque<Candidate<'a>> {
        match phase {
            Phase::Required => &mut self.required_queue,
            Phase::Recommended => &mut self.recommended_queue,
        }
    }

    fn is_seen(&self, collection: Option<&str>, name: &str) -> bool {
        collection.is_some_and(|c| self.seen_collections.contains(c)) || self.seen_names.contains(name)
    }

    fn mark_seen(&mut self, collection: Option<&str>, name: &str) {
        if let Some(collection) = collection {
            self.seen_collections.insert(collection.to_string());
        }
        self.seen_names.insert(name.to_string());
    }

    fn accepted_mut(&mut self, collection: Option<&str>, name: &str) -> Option<&mut Accepted<'a>> {
        self.required
            .iter_mut()
            .chain(self.recommended.iter_mut())
            .find(|a| a.matches(collection, name))
    }
}

/// Resolves selections against a priority-ordered list of indexes.
pub struct Resolver<'a> {
    indexes: &'a [Index],
    settings: &'a Settings,
    base_branch: Option<&'a str>,
    download: Regex,
    groups: Vec<(String, Vec<Pattern>)>,
}

impl<'a> Resolver<'a> {
    /// `base_branch` is the branch of indexes that do not pin one.
    pub fn new(indexes: &'a [Index], settings: &'a Settings, base_branch: Option<&'a str>) -> Result<Self> {
        let download = Regex::new(&settings.download_pattern)?;
        let groups = settings
            .extra_groups
            .iter()
            .map(|group| -> Result<(String, Vec<Pattern>)> {
                let patterns = group
                    .patterns
                    .iter()
                    .map(|p| Pattern::new(p.as_str()))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((group.key.clone(), patterns))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            indexes,
            settings,
            base_branch,
            download,
            groups,
        })
    }

    /// Whether `name` is a download (`-dl`) layer.
    pub fn is_download_layer(&self, name: &str) -> bool {
        self.download.is_match(name)
    }

    fn active_branch(&self, index: usize) -> Option<u64> {
        self.indexes[index].active_branch_id(self.base_branch)
    }

    fn identity(&self, candidate: &Candidate<'a>) -> Option<(Option<&'a str>, &'a str)> {
        let index = &self.indexes[candidate.index];
        index
            .layer_of(candidate.layer_branch)
            .map(|layer| (candidate.layer_branch.collection_name(), layer.name.as_str()))
    }

    /// Run one resolution pass.
    pub fn resolve(&self, selection: &Selection) -> Result<Resolution> {
        let mut state = ResolutionState::default();

        self.seed_base_layers(&mut state);
        for (kind, value) in selection.selectors() {
            self.seed_selector(&mut state, kind, value);
        }
        if !state.unresolved.is_empty() {
            return Err(Error::UnresolvedSelectors {
                items: state.unresolved,
            });
        }
        if selection.all_layers {
            self.seed_all_layers(&mut state);
        }

        self.drain(&mut state, Phase::Required, selection);
        self.drain(&mut state, Phase::Recommended, selection);

        self.propagate_explicit(&mut state);
        self.check_groups(&state, selection)?;

        if selection.no_recommend {
            if selection.dl_layers {
                state.recommended.retain(|a| self.is_download_layer(&a.name));
            } else {
                state.recommended.clear();
            }
        }

        Ok(Resolution {
            required: state.required.iter().filter_map(|a| self.to_resolved(a)).collect(),
            recommended: state.recommended.iter().filter_map(|a| self.to_resolved(a)).collect(),
        })
    }

    fn seed_base_layers(&self, state: &mut ResolutionState<'a>) {
        let Some(first) = self.indexes.first() else {
            return;
        };
        let branch = self.active_branch(0);

        for name in &self.settings.base_layers {
            let found = branch
                .map(|id| first.find_layer_branches(id, Lookup::Name(name)))
                .unwrap_or_default();
            if found.is_empty() {
                state.unresolved.push(UnresolvedSelector {
                    kind: "base layer".to_string(),
                    value: name.clone(),
                    close_matches: first.close_matches(Lookup::Name(name)),
                });
                continue;
            }
            for layer_branch in found {
                state.required_queue.push_back(Candidate {
                    index: 0,
                    layer_branch,
                    provenance: Provenance::Explicit,
                });
            }
        }
    }

    fn seed_selector(&self, state: &mut ResolutionState<'a>, kind: SelectorKind, value: &str) {
        // `layer:item` pins the item to a layer
        let lookup = match value.split_once(':') {
            Some((layer, _)) => Lookup::Name(layer),
            None => kind.lookup(value),
        };

        for (position, index) in self.indexes.iter().enumerate() {
            let Some(branch) = self.active_branch(position) else {
                continue;
            };
            let found = index.find_layer_branches(branch, lookup);
            if found.is_empty() {
                continue;
            }
            debug!("{} \"{}\" found in {}", kind, value, index.description());
            for layer_branch in found {
                state.required_queue.push_back(Candidate {
                    index: position,
                    layer_branch,
                    provenance: Provenance::Explicit,
                });
            }
            return;
        }

        let mut close_matches: Vec<String> = Vec::new();
        for index in self.indexes {
            for candidate in index.close_matches(lookup) {
                if !close_matches.contains(&candidate) {
                    close_matches.push(candidate);
                }
            }
        }
        close_matches.truncate(CLOSE_MATCH_LIMIT);

        state.unresolved.push(UnresolvedSelector {
            kind: kind.to_string(),
            value: value.to_string(),
            close_matches,
        });
    }

    fn seed_all_layers(&self, state: &mut ResolutionState<'a>) {
        for (position, index) in self.indexes.iter().enumerate() {
            let Some(branch) = self.active_branch(position) else {
                continue;
            };
            for layer in &index.layer_items {
                let phase = if self.is_download_layer(&layer.name) {
                    Phase::Recommended
                } else {
                    Phase::Required
                };
                for layer_branch in index.find_layer_branches(branch, Lookup::LayerItem(layer.id)) {
                    state.queue(phase).push_back(Candidate {
                        index: position,
                        layer_branch,
                        provenance: Provenance::AllLayers,
                    });
                }
            }
        }
    }

    /// Copies of the candidate's layer in earlier-configured indexes.
    fn earlier_copies(&self, candidate: &Candidate<'a>, collection: Option<&str>, name: &str) -> Vec<Candidate<'a>> {
        for position in 0..candidate.index {
            let Some(branch) = self.active_branch(position) else {
                continue;
            };
            let index = &self.indexes[position];
            let mut found = collection
                .map(|c| index.find_layer_branches(branch, Lookup::Collection(c)))
                .unwrap_or_default();
            if found.is_empty() {
                found = index.find_layer_branches(branch, Lookup::Name(name));
            }
            if !found.is_empty() {
                return found
                    .into_iter()
                    .map(|layer_branch| Candidate {
                        index: position,
                        layer_branch,
                        provenance: candidate.provenance,
                    })
                    .collect();
            }
        }
        Vec::new()
    }

    fn drain(&self, state: &mut ResolutionState<'a>, phase: Phase, selection: &Selection) {
        while let Some(candidate) = state.queue(phase).pop_front() {
            let Some((collection, name)) = self.identity(&candidate) else {
                continue;
            };

            let substitutes = self.earlier_copies(&candidate, collection, name);
            if !substitutes.is_empty() {
                info!(
                    "{} from {} is provided by {}, using that instead",
                    name,
                    self.indexes[candidate.index].description(),
                    self.indexes[substitutes[0].index].description()
                );
                state.queue(phase).extend(substitutes);
                continue;
            }

            if state.is_seen(collection, name) {
                if candidate.provenance == Provenance::Explicit {
                    if let Some(accepted) = state.accepted_mut(collection, name) {
                        accepted.candidate.provenance = Provenance::Explicit;
                    }
                }
                continue;
            }

            if phase == Phase::Recommended && !selection.dl_layers && self.is_download_layer(name) {
                debug!("Skipping download layer {}", name);
                continue;
            }

            state.mark_seen(collection, name);
            let index = &self.indexes[candidate.index];
            let (required, recommended) = index.dependencies(candidate.layer_branch);
            let follow = |layer_branch| Candidate {
                index: candidate.index,
                layer_branch,
                provenance: candidate.provenance,
            };

            let accepted = Accepted {
                candidate,
                name: name.to_string(),
                collection: collection.map(str::to_string),
            };
            match phase {
                Phase::Required => {
                    state.required.push(accepted);
                    state.required_queue.extend(required.into_iter().map(follow));
                    state.recommended_queue.extend(recommended.into_iter().map(follow));
                }
                Phase::Recommended => {
                    state.recommended.push(accepted);
                    state
                        .recommended_queue
                        .extend(required.into_iter().chain(recommended).map(follow));
                }
            }
        }
    }

    /// Mark every accepted layer reachable from an explicit one as explicit.
    fn propagate_explicit(&self, state: &mut ResolutionState<'a>) {
        let mut frontier: Vec<Candidate<'a>> = state
            .required
            .iter()
            .chain(state.recommended.iter())
            .map(|a| a.candidate)
            .filter(|c| c.provenance == Provenance::Explicit)
            .collect();

        while let Some(candidate) = frontier.pop() {
            let index = &self.indexes[candidate.index];
            let (required, recommended) = index.dependencies(candidate.layer_branch);
            for layer_branch in required.into_iter().chain(recommended) {
                let Some(layer) = index.layer_of(layer_branch) else {
                    continue;
                };
                if let Some(accepted) = state.accepted_mut(layer_branch.collection_name(), &layer.name) {
                    if accepted.candidate.provenance != Provenance::Explicit {
                        accepted.candidate.provenance = Provenance::Explicit;
                        frontier.push(accepted.candidate);
                    }
                }
            }
        }
    }

    fn check_groups(&self, state: &ResolutionState<'a>, selection: &Selection) -> Result<()> {
        let mut rejected = Vec::new();
        for accepted in state.required.iter().chain(state.recommended.iter()) {
            if accepted.candidate.provenance == Provenance::Explicit {
                continue;
            }
            for (key, patterns) in &self.groups {
                if selection.enabled_groups.contains(key) {
                    continue;
                }
                if patterns.iter().any(|p| p.matches(&accepted.name)) {
                    rejected.push(GroupLayer {
                        layer: accepted.name.clone(),
                        group: key.clone(),
                    });
                    break;
                }
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(Error::UnauthorizedGroupLayers { layers: rejected })
        }
    }

    fn to_resolved(&self, accepted: &Accepted<'a>) -> Option<ResolvedLayer> {
        let candidate = accepted.candidate;
        let index = &self.indexes[candidate.index];
        let layer_branch = candidate.layer_branch;
        let layer = index.layer_of(layer_branch)?;
        let branch_id = self.active_branch(candidate.index).unwrap_or(layer_branch.branch);
        let revision = match layer_branch.actual_branch_name() {
            Some(actual) => actual.to_string(),
            None => index.branch(branch_id).map(|b| b.name.clone())?,
        };

        Some(ResolvedLayer {
            index: candidate.index,
            layer_branch_id: layer_branch.id,
            branch_id,
            name: layer.name.clone(),
            collection: accepted.collection.clone(),
            vcs_url: layer.vcs_url.clone(),
            vcs_subdir: layer_branch.vcs_subdir.clone(),
            revision,
            bitbake_branch: index.bitbake_branch(layer_branch.branch).map(str::to_string),
        })
    }
}
