//! Default paths for wrlinux-setup.
//!
//! The installer keeps its data (sample configs, manifest fragments, the
//! local layer template and optionally a bundled index) next to itself:
//!
//! ```text
//! <install dir>/
//!     data/settings.yaml  installer settings (optional)
//!     data/samples/       sample configuration files
//!     data/xml/           <layer>.inc / <layer>.xml manifest fragments
//!     data/local_layer/   template of layers/local
//! ```

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the install directory.
pub const INSTALL_DIR_ENV: &str = "WRLINUX_SETUP_INSTALL_DIR";

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/wrlinux-setup` (XDG Base Directory)
/// - macOS: `~/Library/Caches/wrlinux-setup`
/// - Windows: `{FOLDERID_LocalAppData}\wrlinux-setup`
///
/// Falls back to `.wrlinux-setup-cache` in the current directory if the
/// platform cache directory cannot be determined. Relative index cache
/// paths from the settings are resolved against this directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".wrlinux-setup-cache"))
        .join("wrlinux-setup")
}

/// Directory the installer data lives in.
///
/// `WRLINUX_SETUP_INSTALL_DIR` when set, else the directory holding the
/// running executable, else the current directory.
pub fn default_install_dir() -> PathBuf {
    if let Some(dir) = env::var_os(INSTALL_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Settings file used when `--settings` is not given, if it exists.
pub fn settings_file(install_dir: &Path) -> PathBuf {
    install_dir.join("data").join("settings.yaml")
}

pub fn samples_dir(install_dir: &Path) -> PathBuf {
    install_dir.join("data").join("samples")
}

pub fn fragments_dir(install_dir: &Path) -> PathBuf {
    install_dir.join("data").join("xml")
}

pub fn local_layer_template(install_dir: &Path) -> PathBuf {
    install_dir.join("data").join("local_layer")
}
