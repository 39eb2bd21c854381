//! Mirror snapshots: previously serialized indexes that carry their `CFG`.
//!
//! Files are grouped by `CFG.DESCRIPTION`; files of one description are
//! identity-merged. `.git` and `xml` directories are skipped, as are files
//! that are not a JSON object of tables (flat exports, for one).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde_json::Value;

use super::json_files;
use crate::error::Result;
use crate::index::IndexDocument;

const SKIP_DIRS: &[&str] = &[".git", "xml"];

/// Load every mirrored index below `dir`, keyed by description.
pub fn load_mirror(dir: &Path) -> Result<BTreeMap<String, IndexDocument>> {
    let mut indexes: BTreeMap<String, IndexDocument> = BTreeMap::new();
    if !dir.exists() {
        warn!("Mirror index directory {} does not exist", dir.display());
        return Ok(indexes);
    }

    info!("Loading mirror index from {}...", dir.display());
    for file in json_files(dir, SKIP_DIRS)? {
        let content = fs::read_to_string(&file)?;
        let value: Value = serde_json::from_str(&content)?;
        if !value.is_object() {
            warn!("{}: not a table object, not a mirror index file, skipping", file.display());
            continue;
        }
        let document = IndexDocument::from_value(value)?;
        let Some(description) = document.description().map(str::to_string) else {
            warn!("{}: no CFG entry, not a mirror index file, skipping", file.display());
            continue;
        };
        debug!("{}: part of {}", file.display(), description);
        indexes.entry(description).or_default().merge(document)?;
    }
    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::index::table;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value.to_string()).unwrap();
    }

    #[test]
    fn test_groups_files_by_description() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "a/one.json",
            json!({"CFG": {"DESCRIPTION": "A"}, "branches": [{"id": 1, "name": "master"}]}),
        );
        write(
            temp.path(),
            "a/two.json",
            json!({"CFG": {"DESCRIPTION": "A"}, "branches": [{"id": 2, "name": "stable"}]}),
        );
        write(
            temp.path(),
            "b.json",
            json!({"CFG": {"DESCRIPTION": "B"}, "branches": [{"id": 1, "name": "master"}]}),
        );
        write(temp.path(), "nocfg.json", json!({"branches": []}));
        write(
            temp.path(),
            "xml/ignored.json",
            json!({"CFG": {"DESCRIPTION": "C"}, "branches": []}),
        );

        let mirrored = load_mirror(temp.path()).unwrap();
        assert_eq!(mirrored.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(mirrored["A"].tables[table::BRANCHES].len(), 2);
    }

    #[test]
    fn test_conflicting_mirror_files_fail() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "one.json",
            json!({"CFG": {"DESCRIPTION": "A"}, "branches": [{"id": 1, "name": "master"}]}),
        );
        write(
            temp.path(),
            "two.json",
            json!({"CFG": {"DESCRIPTION": "A"}, "branches": [{"id": 1, "name": "main"}]}),
        );

        let err = load_mirror(temp.path()).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
    }

    #[test]
    fn test_flat_export_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "flat.json",
            json!([{"pk": 1, "model": "layerindex.branch", "fields": {"name": "master"}}]),
        );
        write(
            temp.path(),
            "a.json",
            json!({"CFG": {"DESCRIPTION": "A"}, "branches": [{"id": 1, "name": "master"}]}),
        );

        let mirrored = load_mirror(temp.path()).unwrap();
        assert_eq!(mirrored.keys().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn test_missing_mirror_directory_is_empty() {
        let mirrored = load_mirror(Path::new("/nonexistent/mirror")).unwrap();
        assert!(mirrored.is_empty());
    }
}
