//! # Deps Command Implementation
//!
//! Dumps the layer dependencies of every loaded index on its active branch.
//!
//! The default output is one line per layer, sorted by name:
//!
//! ```text
//! meta-x86 openembedded-core (meta-extras)
//! ```
//!
//! that is, the layer, its required dependencies and, in parentheses, its
//! recommended dependencies. With `--tree` the required dependencies are
//! expanded recursively instead.

use std::borrow::Cow;
use std::collections::HashSet;

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};

use super::{Global, IndexArgs};
use wrlinux_setup::index::{Index, LayerBranch};

/// Show the required and recommended dependencies of every layer
#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Show required dependencies as a tree
    #[arg(long)]
    pub tree: bool,

    /// Maximum depth of the tree (0 shows the layers only)
    #[arg(long, value_name = "NUM", requires = "tree")]
    pub depth: Option<usize>,

    #[command(flatten)]
    pub index: IndexArgs,
}

/// `(layer, required, recommended)` with dependency names sorted.
pub type DependencyLine = (String, Vec<String>, Vec<String>);

fn names(index: &Index, layer_branches: &[&LayerBranch]) -> Vec<String> {
    let mut names: Vec<String> = layer_branches
        .iter()
        .filter_map(|lb| index.layer_of(lb))
        .map(|layer| layer.name.clone())
        .collect();
    names.sort();
    names
}

/// Dependency lines of one index, sorted by layer name.
pub fn dependency_lines(index: &Index, base_branch: &str) -> Vec<DependencyLine> {
    let Some(branch_id) = index.active_branch_id(Some(base_branch)) else {
        return Vec::new();
    };

    let mut lines: Vec<DependencyLine> = index
        .layer_branches
        .iter()
        .filter(|lb| lb.branch == branch_id)
        .filter_map(|lb| {
            let layer = index.layer_of(lb)?;
            let (required, recommended) = index.dependencies(lb);
            Some((
                layer.name.clone(),
                names(index, &required),
                names(index, &recommended),
            ))
        })
        .collect();
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    lines
}

pub fn format_line((name, required, recommended): &DependencyLine) -> String {
    format!("{} {} ({})", name, required.join(" "), recommended.join(" "))
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub label: String,
    pub children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _style: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

fn layer_node(
    index: &Index,
    layer_branch: &LayerBranch,
    max_depth: usize,
    depth: usize,
    path: &mut HashSet<u64>,
) -> TreeNode {
    let name = index
        .layer_of(layer_branch)
        .map(|layer| layer.name.clone())
        .unwrap_or_else(|| format!("layer-branch {}", layer_branch.id));

    if !path.insert(layer_branch.id) {
        return TreeNode {
            label: format!("{} (cycle)", name),
            children: Vec::new(),
        };
    }

    let mut children = Vec::new();
    if depth < max_depth {
        let (mut required, recommended) = index.dependencies(layer_branch);
        required.sort_by_key(|lb| index.layer_of(lb).map(|l| l.name.clone()));
        for dep in required {
            children.push(layer_node(index, dep, max_depth, depth + 1, path));
        }
        for name in names(index, &recommended) {
            children.push(TreeNode {
                label: format!("{} (recommended)", name),
                children: Vec::new(),
            });
        }
    }

    path.remove(&layer_branch.id);
    TreeNode {
        label: name,
        children,
    }
}

/// The dependency tree of one index.
pub fn build_tree(index: &Index, base_branch: &str, max_depth: usize) -> TreeNode {
    let mut layers: Vec<&LayerBranch> = match index.active_branch_id(Some(base_branch)) {
        Some(branch_id) => index
            .layer_branches
            .iter()
            .filter(|lb| lb.branch == branch_id)
            .collect(),
        None => Vec::new(),
    };
    layers.sort_by_key(|lb| index.layer_of(lb).map(|l| l.name.clone()));

    let mut path = HashSet::new();
    TreeNode {
        label: format!("Index: {}", index.description()),
        children: layers
            .into_iter()
            .map(|lb| layer_node(index, lb, max_depth, 0, &mut path))
            .collect(),
    }
}

/// Execute the `deps` command.
pub fn execute(args: DepsArgs, global: &Global) -> Result<()> {
    let settings = global.load_settings()?;
    let loaded = args.index.load(global, &settings)?;

    for index in &loaded.indexes {
        if args.tree {
            let tree = build_tree(index, &loaded.base_branch, args.depth.unwrap_or(usize::MAX));
            print_tree(&tree).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
        } else {
            for line in dependency_lines(index, &loaded.base_branch) {
                println!("{}", format_line(&line));
            }
        }
    }
    Ok(())
}
