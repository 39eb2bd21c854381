//! # Repo Manifest
//!
//! Renders the `default.xml` manifest the `repo` tool syncs the project
//! from, and reads `linkfile` destinations back out of it.
//!
//! Layout of the generated manifest:
//!
//! ```xml
//! <manifest>
//!     <remote name="base" fetch="<base url>"/>
//!     <default revision="<base branch>" remote="base" sync-j="<jobs>"/>
//!     <remote name="..." fetch="..."/>           (remaining remotes, by name)
//!     <project name="<relative url>" remote="..." path="layers/..." revision="...">
//!         (contents of data/xml/<layer>.inc)
//!     </project>
//!     (contents of data/xml/<layer>.xml)
//! </manifest>
//! ```
//!
//! The manifest is built as an xot tree, so attribute values are escaped on
//! output and a fragment that does not parse is reported against its own
//! file.
//!
//! One project is written per repository (layers sharing a repository share
//! the project of the first of them), sorted by relative URL.
//! `openembedded-core` brings bitbake along as an extra project checked out
//! inside it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use xot::{Node, Xot};

use crate::error::{Error, Result};
use crate::resolver::remotes::BASE_REMOTE;
use crate::resolver::{Remotes, Resolution};

/// File name of the manifest inside the project.
pub const MANIFEST_FILE: &str = "default.xml";

/// The layer whose checkout also holds bitbake.
pub const OE_CORE_LAYER: &str = "openembedded-core";

#[derive(Debug, Clone)]
pub struct ManifestOptions<'a> {
    /// Default revision of every project.
    pub base_branch: &'a str,
    /// `sync-j` value.
    pub jobs: usize,
    /// Repository name of bitbake on the openembedded-core server.
    pub bitbake: &'a str,
    /// Directory holding `<layer>.inc` and `<layer>.xml` fragments.
    pub fragments: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProjectEntry {
    name: String,
    remote: String,
    path: String,
    revision: String,
}

fn manifest_error(e: impl std::fmt::Display) -> Error {
    Error::Manifest {
        message: e.to_string(),
    }
}

/// Top-level nodes of `<dir>/<name>.<extension>`, parsed into `xot`.
///
/// Whitespace-only text between the nodes is dropped; the caller lays the
/// nodes out itself.
fn fragment(
    xot: &mut Xot,
    options: &ManifestOptions<'_>,
    name: &str,
    extension: &str,
) -> Result<Vec<Node>> {
    let Some(dir) = options.fragments else {
        return Ok(Vec::new());
    };
    let path = dir.join(format!("{}.{}", name, extension));
    debug!("Looking for {}", path.display());
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    let document = xot.parse_fragment(&content).map_err(|e| Error::Manifest {
        message: format!("{} is not well-formed: {}", path.display(), e),
    })?;
    let nodes: Vec<Node> = xot
        .children(document)
        .filter(|node| xot.text_str(*node).is_none_or(|text| !text.trim().is_empty()))
        .collect();
    // last first: detaching merges the text around a node into its predecessor
    for node in nodes.iter().rev() {
        xot.detach(*node).map_err(manifest_error)?;
    }
    Ok(nodes)
}

fn element(xot: &mut Xot, name: &str, attributes: &[(&str, &str)]) -> Node {
    let name = xot.add_name(name);
    let node = xot.new_element(name);
    for (key, value) in attributes {
        let key = xot.add_name(key);
        xot.set_attribute(node, key, *value);
    }
    node
}

/// Append `child` on its own line, indented `depth` levels.
fn append_line(xot: &mut Xot, parent: Node, child: Node, depth: usize) -> Result<()> {
    let indent = xot.new_text(&format!("\n{}", "    ".repeat(depth)));
    xot.append(parent, indent).map_err(manifest_error)?;
    xot.append(parent, child).map_err(manifest_error)
}

/// Group the resolved layers into projects keyed by relative URL.
fn projects(
    resolution: &Resolution,
    remotes: &Remotes,
    bitbake: &str,
) -> Result<BTreeMap<String, Vec<ProjectEntry>>> {
    let mut projects: BTreeMap<String, Vec<ProjectEntry>> = BTreeMap::new();

    for layer in resolution.layers() {
        let (remote, url) = remotes.relative_url(&layer.vcs_url).ok_or_else(|| Error::Manifest {
            message: format!("no remote covers {} ({})", layer.name, layer.vcs_url),
        })?;
        let path = layer.repository_path();

        if layer.name == OE_CORE_LAYER {
            let revision = layer
                .bitbake_branch
                .clone()
                .unwrap_or_else(|| layer.revision.clone());
            projects.entry(bitbake.to_string()).or_default().push(ProjectEntry {
                name: bitbake.to_string(),
                remote: remote.name.clone(),
                path: format!("{}/bitbake", path),
                revision,
            });
        }

        projects.entry(url.to_string()).or_default().push(ProjectEntry {
            name: layer.name.clone(),
            remote: remote.name.clone(),
            path,
            revision: layer.revision.clone(),
        });
    }
    Ok(projects)
}

/// Render the manifest text.
pub fn render(resolution: &Resolution, remotes: &Remotes, options: &ManifestOptions<'_>) -> Result<String> {
    let mut xot = Xot::new();
    let manifest = element(&mut xot, "manifest", &[]);
    let document = xot.new_document_with_element(manifest).map_err(manifest_error)?;

    let base = remotes.base();
    let remote = element(&mut xot, "remote", &[("name", BASE_REMOTE), ("fetch", base.fetch.as_str())]);
    append_line(&mut xot, manifest, remote, 1)?;
    let jobs = options.jobs.to_string();
    let default = element(
        &mut xot,
        "default",
        &[
            ("revision", options.base_branch),
            ("remote", BASE_REMOTE),
            ("sync-j", jobs.as_str()),
        ],
    );
    append_line(&mut xot, manifest, default, 1)?;

    let mut others: Vec<_> = remotes.iter().filter(|r| r.name != BASE_REMOTE).collect();
    others.sort_by(|a, b| a.name.cmp(&b.name));
    for other in others {
        let remote = element(
            &mut xot,
            "remote",
            &[("name", other.name.as_str()), ("fetch", other.fetch.as_str())],
        );
        append_line(&mut xot, manifest, remote, 1)?;
    }

    for (url, entries) in projects(resolution, remotes, options.bitbake)? {
        let first = &entries[0];
        let project = element(
            &mut xot,
            "project",
            &[
                ("name", url.as_str()),
                ("remote", first.remote.as_str()),
                ("path", first.path.as_str()),
                ("revision", first.revision.as_str()),
            ],
        );
        append_line(&mut xot, manifest, project, 1)?;

        let mut nested = false;
        for entry in &entries {
            for node in fragment(&mut xot, options, &entry.name, "inc")? {
                append_line(&mut xot, project, node, 2)?;
                nested = true;
            }
        }
        if nested {
            let close = xot.new_text("\n    ");
            xot.append(project, close).map_err(manifest_error)?;
        }

        for entry in &entries {
            for node in fragment(&mut xot, options, &entry.name, "xml")? {
                append_line(&mut xot, manifest, node, 1)?;
            }
        }
    }

    let close = xot.new_text("\n");
    xot.append(manifest, close).map_err(manifest_error)?;

    let mut out = xot.to_string(document).map_err(manifest_error)?;
    out.push('\n');
    Ok(out)
}

fn parse(manifest: &str) -> Result<(Xot, Node)> {
    let mut xot = Xot::new();
    let root = xot.parse(manifest).map_err(|e| Error::Manifest {
        message: format!("manifest is not well-formed: {}", e),
    })?;
    Ok((xot, root))
}

/// `dest` of every `linkfile` element.
pub fn linkfile_destinations(manifest: &str) -> Result<Vec<String>> {
    let (mut xot, root) = parse(manifest)?;
    let linkfile = xot.add_name("linkfile");
    let dest = xot.add_name("dest");

    let destinations = xot
        .descendants(root)
        .filter(|node| xot.element(*node).is_some_and(|e| e.name() == linkfile))
        .filter_map(|node| xot.get_attribute(node, dest).map(str::to_string))
        .collect();
    Ok(destinations)
}

/// Write the manifest into the project directory.
pub fn write(project_dir: &Path, manifest: &str) -> Result<PathBuf> {
    let path = project_dir.join(MANIFEST_FILE);
    fs::write(&path, manifest)?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolvedLayer;
    use tempfile::TempDir;

    fn layer(name: &str, vcs_url: &str, revision: &str) -> ResolvedLayer {
        ResolvedLayer {
            index: 0,
            layer_branch_id: 1,
            branch_id: 1,
            name: name.to_string(),
            collection: None,
            vcs_url: vcs_url.to_string(),
            vcs_subdir: String::new(),
            revision: revision.to_string(),
            bitbake_branch: Some("1.46".to_string()),
        }
    }

    fn sample() -> (Resolution, Remotes) {
        let resolution = Resolution {
            required: vec![
                layer("openembedded-core", "git://git.openembedded.org/openembedded-core", "master"),
                layer("meta-oe", "git://git.openembedded.org/meta-openembedded", "master"),
                layer("wr-base", "git://mirror.example.com/wrlinux/wr-base", "WRLINUX_10"),
            ],
            recommended: vec![layer(
                "meta-python",
                "git://git.openembedded.org/meta-openembedded",
                "master",
            )],
        };
        let known = vec![("git://git.openembedded.org".to_string(), "openembedded".to_string())];
        let remotes = Remotes::compute(
            "git://mirror.example.com/wrlinux",
            &known,
            resolution.layers().map(|l| l.vcs_url.as_str()),
        );
        (resolution, remotes)
    }

    fn options(fragments: Option<&Path>) -> ManifestOptions<'_> {
        ManifestOptions {
            base_branch: "WRLINUX_10",
            jobs: 4,
            bitbake: "bitbake",
            fragments,
        }
    }

    #[test]
    fn test_render_layout() {
        let (resolution, remotes) = sample();
        let manifest = render(&resolution, &remotes, &options(None)).unwrap();
        let lines: Vec<&str> = manifest.lines().collect();

        assert_eq!(lines[0], "<manifest>");
        assert!(lines[1].starts_with("    <remote name=\"base\" fetch=\"git://mirror.example.com/wrlinux\""));
        assert!(lines[2].starts_with("    <default revision=\"WRLINUX_10\" remote=\"base\" sync-j=\"4\""));
        assert!(lines[3].starts_with("    <remote name=\"openembedded\" fetch=\"git://git.openembedded.org\""));
        assert_eq!(lines.last(), Some(&"</manifest>"));
        assert!(manifest.ends_with("</manifest>\n"));
    }

    #[test]
    fn test_projects_sorted_and_shared() {
        let (resolution, remotes) = sample();
        let manifest = render(&resolution, &remotes, &options(None)).unwrap();
        let projects: Vec<&str> = manifest
            .lines()
            .filter(|l| l.trim_start().starts_with("<project"))
            .collect();

        assert_eq!(projects.len(), 4);
        assert!(projects[0].contains("name=\"bitbake\" remote=\"openembedded\" path=\"layers/openembedded-core/bitbake\" revision=\"1.46\""));
        assert!(projects[1].contains("name=\"meta-openembedded\""));
        assert!(projects[1].contains("path=\"layers/meta-openembedded\""));
        assert!(projects[2].contains("name=\"openembedded-core\""));
        assert!(projects[3].contains("name=\"wr-base\" remote=\"base\" path=\"layers/wr-base\" revision=\"WRLINUX_10\""));
    }

    #[test]
    fn test_fragments_are_included() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("meta-python.inc"),
            "        <linkfile src=\"scripts/x\" dest=\"bin/x\"/>\n",
        )
        .unwrap();
        fs::write(
            temp.path().join("wr-base.xml"),
            "    <project name=\"extra\" path=\"extra\"/>",
        )
        .unwrap();

        let (resolution, remotes) = sample();
        let manifest = render(&resolution, &remotes, &options(Some(temp.path()))).unwrap();

        let linkfile = manifest.find("<linkfile").unwrap();
        let meta_oe = manifest.find("name=\"meta-openembedded\"").unwrap();
        let oe_core = manifest.find("name=\"openembedded-core\"").unwrap();
        assert!(meta_oe < linkfile && linkfile < oe_core);
        assert!(manifest.contains("<project name=\"extra\" path=\"extra\"/>\n</manifest>"));

        assert_eq!(linkfile_destinations(&manifest).unwrap(), vec!["bin/x".to_string()]);
    }

    #[test]
    fn test_broken_fragment_is_a_manifest_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("wr-base.inc"), "<copyfile").unwrap();

        let (resolution, remotes) = sample();
        let err = render(&resolution, &remotes, &options(Some(temp.path()))).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn test_uncovered_url_is_an_error() {
        let (resolution, _) = sample();
        let remotes = Remotes::new("git://elsewhere");
        let err = render(&resolution, &remotes, &options(None)).unwrap_err();
        assert!(err.to_string().contains("no remote covers openembedded-core"));
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let (mut resolution, remotes) = sample();
        resolution.required[2].revision = "WR<10>&\"next\"".to_string();
        let mut opts = options(None);
        opts.base_branch = "a&b";

        let manifest = render(&resolution, &remotes, &opts).unwrap();
        assert!(manifest.contains("revision=\"a&amp;b\""));
        assert!(!manifest.contains("a&b"));

        let (mut xot, root) = parse(&manifest).unwrap();
        let revision = xot.add_name("revision");
        let revisions: Vec<String> = xot
            .descendants(root)
            .filter_map(|node| xot.get_attribute(node, revision).map(str::to_string))
            .collect();
        assert!(revisions.contains(&"a&b".to_string()));
        assert!(revisions.contains(&"WR<10>&\"next\"".to_string()));
    }

    #[test]
    fn test_fragment_error_names_the_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("wr-base.xml"), "<project name=\"x\"><linkfile/>").unwrap();

        let (resolution, remotes) = sample();
        let err = render(&resolution, &remotes, &options(Some(temp.path()))).unwrap_err();
        assert!(err.to_string().contains("wr-base.xml"));
    }
}
