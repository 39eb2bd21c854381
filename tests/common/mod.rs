//! Shared test utilities for integration and E2E tests.
//!
//! [`TestFixture`] lays out a throwaway installer directory the way a real
//! checkout looks:
//!
//! ```text
//! <temp>/install/data/settings.yaml
//! <temp>/install/data/samples/*.sample
//! <temp>/install/data/local_layer/conf/layer.conf
//! <temp>/install/index/index.json
//! <temp>/project/
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new();
//!     fixture.command_with_base().arg("list").arg("layers").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    pub use super::TestFixture;
}

/// Settings and sample file contents used by the fixture.
#[allow(dead_code)]
pub mod configs {
    pub const BASE_URL: &str = "git://git.example.com/wrlinux";
    pub const BASE_BRANCH: &str = "master";

    /// The fixture index as served from `<install>/index`.
    pub const LOCAL_INDEX: &str = include_str!("../testdata/local/index.json");

    pub const SETTINGS: &str = r##"
indexes:
  - description: Local Layer Index
    type: restapi-files
    url: "#INSTALL_DIR#/index"
base_layers: [openembedded-core, wr-base]
default_distro: wrlinux
default_machine: qemux86-64
repo_jobs: 2
"##;

    /// Settings naming an index directory that does not exist.
    pub const MISSING_INDEX: &str = r##"
indexes:
  - description: Gone
    type: restapi-files
    url: "#INSTALL_DIR#/nowhere"
"##;

    pub const README: &str = "Set up with: ####SETUP_ARGS####\n";
    pub const BBLAYERS: &str = "BBLAYERS ?= \" \\\n   ####LAYERS#### \\\n   \"\n";
    pub const CONF_NOTES: &str = "Machines:\n####MACHINES####\n";
    pub const LOCAL_CONF: &str = "MACHINE ??= \"####DEFAULTMACHINE####\"\n\
                                  DISTRO ??= \"####DEFAULTDISTRO####\"\n\
                                  WRTEMPLATE ??= \"####DEFAULTWRTEMPLATE####\"\n\
                                  LINUX_KERNEL_TYPE ??= \"####DEFAULTKTYPE####\"\n";
    pub const LAYER_CONF: &str = "BBPATH .= \":${LAYERDIR}\"\nBBFILE_COLLECTIONS += \"local\"\n";
}

/// A temporary installer directory plus an empty project directory.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// An installer with the stock fixture settings, samples and index.
    pub fn new() -> Self {
        Self::bare()
            .with_file("install/data/settings.yaml", configs::SETTINGS)
            .with_file("install/data/samples/README.sample", configs::README)
            .with_file("install/data/samples/bblayers.conf.sample", configs::BBLAYERS)
            .with_file("install/data/samples/conf-notes.sample", configs::CONF_NOTES)
            .with_file("install/data/samples/local.conf.sample", configs::LOCAL_CONF)
            .with_file("install/data/local_layer/conf/layer.conf", configs::LAYER_CONF)
            .with_file("install/index/index.json", configs::LOCAL_INDEX)
    }

    /// An installer directory with nothing in it.
    pub fn bare() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("project")
            .create_dir_all()
            .expect("Failed to create project directory");
        Self { temp_dir }
    }

    /// Replace the installed settings.
    #[allow(dead_code)]
    pub fn with_settings(self, content: &str) -> Self {
        self.with_file("install/data/settings.yaml", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn install_dir(&self) -> PathBuf {
        self.path().join("install")
    }

    #[allow(dead_code)]
    pub fn project_dir(&self) -> PathBuf {
        self.path().join("project")
    }

    /// Contents of a file below the temp directory.
    #[allow(dead_code)]
    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.path().join(path))
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e))
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// The binary pointed at the fixture installer, isolated from the
    /// caller's environment.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wrlinux-setup");
        cmd.current_dir(self.path())
            .env_remove("OE_BASEURL")
            .env_remove("OE_BASEBRANCH")
            .env_remove("WRLINUX_SETUP_SETTINGS")
            .env_remove("RUST_LOG")
            .env("WRLINUX_SETUP_CACHE", self.path().join("cache"))
            .env("NO_COLOR", "1")
            .arg("--install-dir")
            .arg(self.install_dir());
        cmd
    }

    /// [`TestFixture::command`] with the base URL and branch set.
    #[allow(dead_code)]
    pub fn command_with_base(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.env("OE_BASEURL", configs::BASE_URL)
            .env("OE_BASEBRANCH", configs::BASE_BRANCH);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrlinux_setup::index::IndexDocument;
    use wrlinux_setup::settings::Settings;

    #[test]
    fn test_fixture_lays_out_installer() {
        let fixture = TestFixture::new();
        assert!(fixture.install_dir().join("data/settings.yaml").exists());
        assert!(fixture.install_dir().join("index/index.json").exists());
        assert!(fixture.project_dir().is_dir());
    }

    #[test]
    fn test_settings_parse() {
        let settings = Settings::parse(configs::SETTINGS).expect("Settings should parse");
        assert_eq!(settings.indexes.len(), 1);
        assert_eq!(settings.repo_jobs, 2);
        Settings::parse(configs::MISSING_INDEX).expect("Settings should parse");
    }

    #[test]
    fn test_local_index_parses() {
        let value = serde_json::from_str(configs::LOCAL_INDEX).expect("Index should be JSON");
        let document = IndexDocument::from_value(value).expect("Index should have tables");
        assert_eq!(document.tables["layerItems"].len(), 5);
    }
}
