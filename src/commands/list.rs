//! # List Command Implementation
//!
//! Lists what each loaded index offers on its active branch (the branch the
//! index is pinned to, else the base branch): layers, distros, machines,
//! recipes or templates. Each index gets its own table headed by
//! `Index: <description>`.
//!
//! `list layers --revisions` prints one `<layer> <vcs url> <branch> <last
//! revision>` line per layer instead, for scripts that pin or mirror the
//! layer repositories. The branch is the layer-branch's `actual_branch`,
//! else the index branch; the revision is `vcs_last_rev`, `-` when the index
//! does not record one.
//!
//! This command is a safe, read-only operation that does not modify any files.

use std::fmt::Write as _;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use super::{Global, IndexArgs};
use wrlinux_setup::index::Index;
use wrlinux_setup::output::{clip, heading, OutputConfig};

/// What to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Layers,
    Distros,
    Machines,
    Recipes,
    Templates,
}

/// List index contents
#[derive(Args, Debug)]
pub struct ListArgs {
    /// What to list
    #[arg(value_enum)]
    pub kind: ListKind,

    /// With `layers`: print the branch and last revision of each layer
    #[arg(long)]
    pub revisions: bool,

    #[command(flatten)]
    pub index: IndexArgs,
}

const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

fn list_layers(out: &mut String, index: &Index, branch_id: u64) {
    let _ = writeln!(out, "{:25} summary", "layer");
    let _ = writeln!(out, "{}", rule());
    for layer_branch in index.layer_branches.iter().filter(|lb| lb.branch == branch_id) {
        let Some(layer) = index.layer_of(layer_branch) else {
            continue;
        };
        let summary = layer
            .summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&layer.name);
        let _ = writeln!(out, "{:25} {}", layer.name, clip(summary, 52));
    }
}

fn list_revisions(out: &mut String, index: &Index, branch_id: u64) {
    let branch_name = index.branch(branch_id).map(|b| b.name.as_str()).unwrap_or_default();
    for layer_branch in index.layer_branches.iter().filter(|lb| lb.branch == branch_id) {
        let Some(layer) = index.layer_of(layer_branch) else {
            continue;
        };
        let revision = layer_branch
            .extra
            .get("vcs_last_rev")
            .and_then(|v| v.as_str())
            .filter(|r| !r.is_empty())
            .unwrap_or("-");
        let _ = writeln!(
            out,
            "{} {} {} {}",
            layer.name,
            layer.vcs_url,
            layer_branch.actual_branch_name().unwrap_or(branch_name),
            revision
        );
    }
}

/// `(name, description, layerbranch)` of the listed table.
fn named_items(index: &Index, kind: ListKind) -> Vec<(&str, Option<&str>, u64)> {
    match kind {
        ListKind::Distros => index
            .distros
            .iter()
            .map(|d| (d.name.as_str(), d.description.as_deref(), d.layerbranch))
            .collect(),
        ListKind::Machines => index
            .machines
            .iter()
            .map(|m| (m.name.as_str(), m.description.as_deref(), m.layerbranch))
            .collect(),
        ListKind::Templates => index
            .templates
            .iter()
            .map(|t| (t.name.as_str(), t.description.as_deref(), t.layerbranch))
            .collect(),
        ListKind::Layers | ListKind::Recipes => Vec::new(),
    }
}

fn list_named(out: &mut String, index: &Index, branch_id: u64, kind: ListKind) {
    let column = match kind {
        ListKind::Distros => "distro",
        ListKind::Machines => "machine",
        _ => "templates",
    };
    let _ = writeln!(out, "{:24} {:34} layer", column, "description");
    let _ = writeln!(out, "{}", rule());

    let items = named_items(index, kind);
    for layer_branch in index.layer_branches.iter().filter(|lb| lb.branch == branch_id) {
        let Some(layer) = index.layer_of(layer_branch) else {
            continue;
        };
        for &(name, description, _) in items.iter().filter(|(_, _, lb)| *lb == layer_branch.id) {
            let description = description.map(str::trim).filter(|d| !d.is_empty()).unwrap_or(name);
            let _ = writeln!(out, "{:24} {:34} {}", name, clip(description, 34), layer.name);
        }
    }
}

fn list_recipes(out: &mut String, index: &Index, branch_id: u64) {
    let _ = writeln!(out, "{:15} {:9} summary", "recipe", "version");
    let _ = writeln!(out, "{}", rule());
    for layer_branch in index.layer_branches.iter().filter(|lb| lb.branch == branch_id) {
        if index.layer_of(layer_branch).is_none() {
            continue;
        }
        for recipe in index.recipes.iter().filter(|r| r.layerbranch == layer_branch.id) {
            let summary = recipe
                .summary
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&recipe.pn);
            let _ = writeln!(
                out,
                "{:15} {:9} {}",
                recipe.pn,
                recipe.pv.as_deref().unwrap_or(""),
                clip(summary, 50)
            );
        }
    }
}

/// Render the listing of every index.
pub fn render(
    indexes: &[Index],
    base_branch: &str,
    kind: ListKind,
    revisions: bool,
    output: &OutputConfig,
) -> String {
    let mut out = String::new();
    for index in indexes {
        let title = if index.config.description.is_empty() {
            &index.config.url
        } else {
            &index.config.description
        };
        let _ = writeln!(out, "{}", heading(output, &format!("Index: {}", title)));

        let branch_id = index.active_branch_id(Some(base_branch));
        match kind {
            ListKind::Layers if revisions => {
                list_revisions(&mut out, index, branch_id.unwrap_or_default());
            }
            ListKind::Layers => {
                list_layers(&mut out, index, branch_id.unwrap_or_default());
            }
            ListKind::Recipes => {
                list_recipes(&mut out, index, branch_id.unwrap_or_default());
            }
            _ => {
                list_named(&mut out, index, branch_id.unwrap_or_default(), kind);
            }
        }
        out.push('\n');
    }
    out
}

/// Execute the `list` command.
pub fn execute(args: ListArgs, global: &Global) -> Result<()> {
    if args.revisions && args.kind != ListKind::Layers {
        bail!("--revisions only applies to 'list layers'");
    }
    let settings = global.load_settings()?;
    let loaded = args.index.load(global, &settings)?;
    print!(
        "{}",
        render(
            &loaded.indexes,
            &loaded.base_branch,
            args.kind,
            args.revisions,
            &global.output
        )
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrlinux_setup::index::{Distro, Index, IndexConfig, Recipe, SourceType};

    fn sample() -> Index {
        let json = r#"{
            "branches": [{"id": 1, "name": "master"}, {"id": 2, "name": "stable"}],
            "layerItems": [
                {"id": 1, "name": "openembedded-core", "summary": "Core metadata", "vcs_url": "git://example.com/oe-core"},
                {"id": 2, "name": "meta-x86", "summary": "", "vcs_url": "git://example.com/meta-x86"}
            ],
            "layerBranches": [
                {"id": 11, "layer": 1, "branch": 1, "collection": "core", "vcs_last_rev": "0123abcd"},
                {"id": 12, "layer": 2, "branch": 1, "collection": "x86", "actual_branch": "x86-next", "vcs_last_rev": ""},
                {"id": 21, "layer": 1, "branch": 2, "collection": "core"}
            ],
            "layerDependencies": [],
            "machines": [
                {"id": 1, "name": "qemux86-64", "description": "  QEMU x86-64  ", "layerbranch": 12},
                {"id": 2, "name": "old-machine", "description": "", "layerbranch": 21}
            ],
            "distros": [],
            "recipes": [],
            "wrtemplates": []
        }"#;
        let document =
            wrlinux_setup::index::IndexDocument::from_value(serde_json::from_str(json).unwrap())
                .unwrap();
        let mut index = Index::from_document(
            document,
            IndexConfig::new("Test Index", SourceType::RestApiFiles, "/tmp/index"),
        )
        .unwrap();
        index.distros.push(Distro {
            id: 1,
            name: "nodistro".to_string(),
            description: None,
            layerbranch: 11,
            extra: Default::default(),
        });
        index.recipes.push(Recipe {
            id: 1,
            pn: "busybox".to_string(),
            pv: Some("1.31.1".to_string()),
            summary: Some("Tiny versions of many common UNIX utilities in a single small executable".to_string()),
            layerbranch: 11,
            extra: Default::default(),
        });
        index
    }

    fn plain() -> OutputConfig {
        OutputConfig::from_env_and_flag("never")
    }

    #[test]
    fn test_list_layers() {
        let out = render(&[sample()], "master", ListKind::Layers, false, &plain());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Index: Test Index");
        assert_eq!(lines[1], format!("{:25} summary", "layer"));
        assert_eq!(lines[2], "-".repeat(80));
        assert_eq!(lines[3], format!("{:25} Core metadata", "openembedded-core"));
        // an empty summary shows the name
        assert_eq!(lines[4], format!("{:25} meta-x86", "meta-x86"));
        assert_eq!(lines[5], "");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_list_machines_on_active_branch_only() {
        let out = render(&[sample()], "master", ListKind::Machines, false, &plain());
        assert!(out.contains(&format!("{:24} {:34} meta-x86", "qemux86-64", "QEMU x86-64")));
        assert!(!out.contains("old-machine"));

        let out = render(&[sample()], "stable", ListKind::Machines, false, &plain());
        assert!(out.contains(&format!("{:24} {:34} openembedded-core", "old-machine", "old-machine")));
    }

    #[test]
    fn test_list_distros_and_recipes() {
        let out = render(&[sample()], "master", ListKind::Distros, false, &plain());
        assert!(out.contains(&format!("{:24} {:34} openembedded-core", "nodistro", "nodistro")));

        let out = render(&[sample()], "master", ListKind::Recipes, false, &plain());
        assert!(out.contains(&format!("{:15} {:9} summary", "recipe", "version")));
        assert!(out.contains(&format!(
            "{:15} {:9} Tiny versions of many common UNIX utilities in a s\n",
            "busybox", "1.31.1"
        )));
    }

    #[test]
    fn test_unknown_branch_lists_headers_only() {
        let out = render(&[sample()], "nonexistent", ListKind::Layers, false, &plain());
        assert_eq!(out, format!("Index: Test Index\n{:25} summary\n{}\n\n", "layer", "-".repeat(80)));
    }

    #[test]
    fn test_list_layer_revisions() {
        let out = render(&[sample()], "master", ListKind::Layers, true, &plain());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Index: Test Index",
                "openembedded-core git://example.com/oe-core master 0123abcd",
                "meta-x86 git://example.com/meta-x86 x86-next -",
                "",
            ]
        );

        let out = render(&[sample()], "stable", ListKind::Layers, true, &plain());
        assert!(out.contains("openembedded-core git://example.com/oe-core stable -\n"));
    }
}
