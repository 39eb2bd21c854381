//! Read-only lookups over one [`Index`].
//!
//! Nothing here mutates the index. Dangling references (a layer-branch whose
//! layer is missing, a dependency whose target has no layer-branch on the
//! branch) are logged and skipped.

use std::fmt;

use log::warn;

use super::{Branch, Index, LayerBranch, LayerItem};
use crate::suggestions::{self, CLOSE_MATCH_CUTOFF, CLOSE_MATCH_LIMIT};

/// The attribute a lookup matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// `LayerItem.id` (for layer-branch lookups: `LayerBranch.id`).
    Id(u64),
    Name(&'a str),
    Distro(&'a str),
    Machine(&'a str),
    /// Recipe `pn`.
    Recipe(&'a str),
    Template(&'a str),
    Collection(&'a str),
    /// Layer-branches of the given `LayerItem.id`.
    LayerItem(u64),
}

/// Kinds of user selector, in the order they are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    Layer,
    Distro,
    Machine,
    Recipe,
    Template,
}

impl SelectorKind {
    pub fn lookup(self, value: &str) -> Lookup<'_> {
        match self {
            SelectorKind::Layer => Lookup::Name(value),
            SelectorKind::Distro => Lookup::Distro(value),
            SelectorKind::Machine => Lookup::Machine(value),
            SelectorKind::Recipe => Lookup::Recipe(value),
            SelectorKind::Template => Lookup::Template(value),
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectorKind::Layer => "layer",
            SelectorKind::Distro => "distro",
            SelectorKind::Machine => "machine",
            SelectorKind::Recipe => "recipe",
            SelectorKind::Template => "template",
        };
        f.write_str(name)
    }
}

/// A layer found through an attribute lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerMatch<'a> {
    pub layer: &'a LayerItem,
    /// Collection of the layer-branch the attribute was found on.
    pub collection: Option<&'a str>,
}

/// Identity and location of a layer-branch's layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerInfo<'a> {
    pub collection: Option<&'a str>,
    pub name: &'a str,
    pub vcs_url: &'a str,
}

impl Index {
    fn layer_by_id(&self, id: u64) -> Option<&LayerItem> {
        self.layer_items.iter().find(|layer| layer.id == id)
    }

    fn layer_branch_by_id(&self, id: u64) -> Option<&LayerBranch> {
        self.layer_branches.iter().find(|lb| lb.id == id)
    }

    /// Ids of the layer-branches that carry the looked-up metadata.
    fn metadata_layer_branches(&self, lookup: Lookup<'_>) -> Vec<u64> {
        match lookup {
            Lookup::Distro(name) => self
                .distros
                .iter()
                .filter(|d| d.name == name)
                .map(|d| d.layerbranch)
                .collect(),
            Lookup::Machine(name) => self
                .machines
                .iter()
                .filter(|m| m.name == name)
                .map(|m| m.layerbranch)
                .collect(),
            Lookup::Recipe(pn) => self
                .recipes
                .iter()
                .filter(|r| r.pn == pn)
                .map(|r| r.layerbranch)
                .collect(),
            Lookup::Template(name) => self
                .templates
                .iter()
                .filter(|t| t.name == name)
                .map(|t| t.layerbranch)
                .collect(),
            Lookup::Collection(collection) => self
                .layer_branches
                .iter()
                .filter(|lb| lb.collection_name() == Some(collection))
                .map(|lb| lb.id)
                .collect(),
            Lookup::Id(_) | Lookup::Name(_) | Lookup::LayerItem(_) => Vec::new(),
        }
    }

    /// Find layers by id, name or an attribute.
    ///
    /// Id and name lookups yield at most one layer. Attribute lookups go
    /// through the metadata table to the owning layer-branches and report the
    /// collection of each.
    pub fn find_layer(&self, lookup: Lookup<'_>) -> Vec<LayerMatch<'_>> {
        match lookup {
            Lookup::Id(id) | Lookup::LayerItem(id) => self
                .layer_by_id(id)
                .map(|layer| LayerMatch {
                    layer,
                    collection: None,
                })
                .into_iter()
                .collect(),
            Lookup::Name(name) => self
                .layer_items
                .iter()
                .find(|layer| layer.name == name)
                .map(|layer| LayerMatch {
                    layer,
                    collection: None,
                })
                .into_iter()
                .collect(),
            _ => {
                let wanted = self.metadata_layer_branches(lookup);
                self.layer_branches
                    .iter()
                    .filter(|lb| wanted.contains(&lb.id))
                    .filter_map(|lb| {
                        self.layer_of(lb).map(|layer| LayerMatch {
                            layer,
                            collection: lb.collection_name(),
                        })
                    })
                    .collect()
            }
        }
    }

    /// Known values of the attribute `lookup` matches on.
    pub fn known_values(&self, lookup: Lookup<'_>) -> Vec<&str> {
        match lookup {
            Lookup::Id(_) | Lookup::LayerItem(_) | Lookup::Name(_) => {
                self.layer_items.iter().map(|l| l.name.as_str()).collect()
            }
            Lookup::Distro(_) => self.distros.iter().map(|d| d.name.as_str()).collect(),
            Lookup::Machine(_) => self.machines.iter().map(|m| m.name.as_str()).collect(),
            Lookup::Recipe(_) => self.recipes.iter().map(|r| r.pn.as_str()).collect(),
            Lookup::Template(_) => self.templates.iter().map(|t| t.name.as_str()).collect(),
            Lookup::Collection(_) => self
                .layer_branches
                .iter()
                .filter_map(|lb| lb.collection_name())
                .collect(),
        }
    }

    /// Nearest known values for a lookup that found nothing.
    pub fn close_matches(&self, lookup: Lookup<'_>) -> Vec<String> {
        let value = match lookup {
            Lookup::Name(v)
            | Lookup::Distro(v)
            | Lookup::Machine(v)
            | Lookup::Recipe(v)
            | Lookup::Template(v)
            | Lookup::Collection(v) => v,
            Lookup::Id(_) | Lookup::LayerItem(_) => return Vec::new(),
        };
        suggestions::close_matches(
            value,
            self.known_values(lookup),
            CLOSE_MATCH_LIMIT,
            CLOSE_MATCH_CUTOFF,
        )
    }

    /// Layer-branches on `branch_id` matching the lookup.
    pub fn find_layer_branches(&self, branch_id: u64, lookup: Lookup<'_>) -> Vec<&LayerBranch> {
        match lookup {
            Lookup::Id(id) => self
                .layer_branches
                .iter()
                .filter(|lb| lb.branch == branch_id && lb.id == id)
                .take(1)
                .collect(),
            Lookup::Collection(collection) => self
                .layer_branches
                .iter()
                .filter(|lb| lb.branch == branch_id && lb.collection_name() == Some(collection))
                .collect(),
            _ => {
                let layer_ids: Vec<u64> = self
                    .find_layer(lookup)
                    .iter()
                    .map(|m| m.layer.id)
                    .collect();
                let mut found = Vec::new();
                for layer_id in layer_ids {
                    found.extend(
                        self.layer_branches
                            .iter()
                            .filter(|lb| lb.branch == branch_id && lb.layer == layer_id),
                    );
                }
                found
            }
        }
    }

    /// `(required, recommended)` dependencies of a layer-branch, resolved to
    /// layer-branches on the same branch.
    pub fn dependencies(&self, layer_branch: &LayerBranch) -> (Vec<&LayerBranch>, Vec<&LayerBranch>) {
        let mut required = Vec::new();
        let mut recommended = Vec::new();

        for edge in self
            .layer_dependencies
            .iter()
            .filter(|dep| dep.layerbranch == layer_branch.id)
        {
            let targets = self.find_layer_branches(layer_branch.branch, Lookup::LayerItem(edge.dependency));
            if targets.is_empty() {
                if edge.required {
                    let source = self
                        .layer_of(layer_branch)
                        .map(|l| l.name.as_str())
                        .unwrap_or("<unknown>");
                    let target = self
                        .layer_by_id(edge.dependency)
                        .map(|l| l.name.clone())
                        .unwrap_or_else(|| format!("layer id {}", edge.dependency));
                    warn!(
                        "{}: {} requires {} which is not available on branch id {}, skipping",
                        self.description(),
                        source,
                        target,
                        layer_branch.branch
                    );
                }
                continue;
            }

            if edge.required {
                required.extend(targets);
            } else {
                recommended.extend(targets);
            }
        }

        (required, recommended)
    }

    /// Id of the branch called `name`.
    pub fn branch_id(&self, name: &str) -> Option<u64> {
        self.branches.iter().find(|b| b.name == name).map(|b| b.id)
    }

    pub fn branch(&self, id: u64) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }

    /// The bitbake branch for a branch, falling back to the branch name.
    pub fn bitbake_branch(&self, id: u64) -> Option<&str> {
        self.branch(id).map(|b| {
            b.bitbake_branch
                .as_deref()
                .filter(|bb| !bb.is_empty())
                .unwrap_or(&b.name)
        })
    }

    /// The branch this index is pinned to, else `default`.
    pub fn index_branch<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.config.branch.as_deref().or(default)
    }

    /// Id of the branch this index resolves against.
    pub fn active_branch_id(&self, default: Option<&str>) -> Option<u64> {
        self.index_branch(default).and_then(|name| self.branch_id(name))
    }

    /// The layer a layer-branch belongs to.
    pub fn layer_of(&self, layer_branch: &LayerBranch) -> Option<&LayerItem> {
        let layer = self.layer_by_id(layer_branch.layer);
        if layer.is_none() {
            warn!(
                "{}: layer-branch {} references missing layer id {}",
                self.description(),
                layer_branch.id,
                layer_branch.layer
            );
        }
        layer
    }

    /// Collection, name and VCS URL of a layer-branch's layer.
    pub fn layer_info<'a>(&'a self, layer_branch: &'a LayerBranch) -> Option<LayerInfo<'a>> {
        self.layer_of(layer_branch).map(|layer| LayerInfo {
            collection: layer_branch.collection_name(),
            name: &layer.name,
            vcs_url: &layer.vcs_url,
        })
    }

    /// The layer-branch with id `id`, on any branch.
    pub fn layer_branch(&self, id: u64) -> Option<&LayerBranch> {
        self.layer_branch_by_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fixtures::*;

    /// core(1) <- bsp-x86(2) requires core, recommends extras(3).
    /// A second branch `stable` (id 2) only carries core.
    fn sample() -> Index {
        let mut index = index_with_layers(
            "Sample",
            &[(1, "core", "core"), (2, "bsp-x86", "x86"), (3, "extras", "extras")],
        );
        index.branches.push(branch(2, "stable"));
        index.layer_branches.push(layer_branch(201, 1, 2, "core"));
        index.layer_dependencies.push(dependency(1, 102, 1, true));
        index.layer_dependencies.push(dependency(2, 102, 3, false));
        index.machines.push(machine(1, "qemux86-64", 102));
        index.distros.push(distro(1, "wrlinux", 101));
        index.recipes.push(recipe(1, "busybox", 101));
        index.templates.push(template(1, "feature/debug", 103));
        index
    }

    #[test]
    fn test_find_layer_by_id_and_name() {
        let index = sample();
        let by_id = index.find_layer(Lookup::Id(2));
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].layer.name, "bsp-x86");

        let by_name = index.find_layer(Lookup::Name("extras"));
        assert_eq!(by_name[0].layer.id, 3);

        assert!(index.find_layer(Lookup::Name("missing")).is_empty());
    }

    #[test]
    fn test_find_layer_by_attribute_reports_collection() {
        let index = sample();
        let found = index.find_layer(Lookup::Machine("qemux86-64"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].layer.name, "bsp-x86");
        assert_eq!(found[0].collection, Some("x86"));

        let found = index.find_layer(Lookup::Template("feature/debug"));
        assert_eq!(found[0].layer.name, "extras");

        let found = index.find_layer(Lookup::Recipe("busybox"));
        assert_eq!(found[0].layer.name, "core");
    }

    #[test]
    fn test_find_layer_branches_filters_by_branch() {
        let index = sample();
        let master = index.branch_id("master").unwrap();
        let stable = index.branch_id("stable").unwrap();

        let on_master = index.find_layer_branches(master, Lookup::Name("core"));
        assert_eq!(on_master.iter().map(|lb| lb.id).collect::<Vec<_>>(), vec![101]);

        let on_stable = index.find_layer_branches(stable, Lookup::Name("core"));
        assert_eq!(on_stable.iter().map(|lb| lb.id).collect::<Vec<_>>(), vec![201]);

        assert!(index
            .find_layer_branches(stable, Lookup::Machine("qemux86-64"))
            .is_empty());
        assert_eq!(
            index.find_layer_branches(master, Lookup::Collection("x86"))[0].id,
            102
        );
        assert_eq!(index.find_layer_branches(master, Lookup::Id(103))[0].layer, 3);
        assert!(index.find_layer_branches(stable, Lookup::Id(103)).is_empty());
    }

    #[test]
    fn test_dependencies_partition_by_required_flag() {
        let index = sample();
        let bsp = index.layer_branch(102).unwrap();
        let (required, recommended) = index.dependencies(bsp);

        assert_eq!(required.iter().map(|lb| lb.id).collect::<Vec<_>>(), vec![101]);
        assert_eq!(recommended.iter().map(|lb| lb.id).collect::<Vec<_>>(), vec![103]);
    }

    #[test]
    fn test_missing_required_target_is_warned_and_skipped() {
        testing_logger::setup();
        let mut index = sample();
        // extras has no layer-branch on `stable`
        index.layer_branches.push(layer_branch(202, 2, 2, "x86"));
        index.layer_dependencies.push(dependency(3, 202, 3, true));

        let bsp_stable = index.layer_branch(202).unwrap().clone();
        let (required, recommended) = index.dependencies(&bsp_stable);

        assert!(required.is_empty());
        assert!(recommended.is_empty());
        testing_logger::validate(|captured| {
            assert!(captured.iter().any(|log| log.level == log::Level::Warn
                && log.body.contains("bsp-x86 requires extras")));
        });
    }

    #[test]
    fn test_branch_helpers() {
        let mut index = sample();
        index.branches[0].bitbake_branch = Some("1.46".to_string());

        assert_eq!(index.branch(2).unwrap().name, "stable");
        assert_eq!(index.bitbake_branch(1), Some("1.46"));
        assert_eq!(index.bitbake_branch(2), Some("stable"));
        assert_eq!(index.bitbake_branch(9), None);

        assert_eq!(index.index_branch(Some("stable")), Some("master"));
        index.config.branch = None;
        assert_eq!(index.index_branch(Some("stable")), Some("stable"));
        assert_eq!(index.active_branch_id(Some("stable")), Some(2));
        assert_eq!(index.active_branch_id(None), None);
    }

    #[test]
    fn test_layer_info() {
        let index = sample();
        let info = index.layer_info(index.layer_branch(102).unwrap()).unwrap();
        assert_eq!(info.collection, Some("x86"));
        assert_eq!(info.name, "bsp-x86");
        assert_eq!(info.vcs_url, "git://git.example.com/bsp-x86");
    }

    #[test]
    fn test_close_matches_per_attribute() {
        let index = sample();
        assert_eq!(
            index.close_matches(Lookup::Machine("qemux86-46")),
            vec!["qemux86-64".to_string()]
        );
        assert_eq!(index.close_matches(Lookup::Name("bsp-x68")), vec!["bsp-x86".to_string()]);
        assert!(index.close_matches(Lookup::Distro("poky-tiny")).is_empty());
    }
}
