//! # Output Configuration
//!
//! Controls how the CLI writes to the terminal: whether listings and log
//! records are colored, and how listing columns are clipped.
//!
//! Color follows the `--color=always|never|auto` flag. In `auto` mode the
//! usual conventions apply:
//! - `NO_COLOR` (any value) disables colors
//! - `CLICOLOR=0` disables colors
//! - `CLICOLOR_FORCE=1` forces colors on a non-TTY
//! - `TERM=dumb` disables colors
//! - otherwise colors are used when stdout is a color-capable terminal
//!
//! ```rust,ignore
//! use wrlinux_setup::output::{OutputConfig, heading};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{}", heading(&config, "Index: Wind River Developer Layer Index"));
//! ```

use std::env;

use console::style;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether colors should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `color_flag` is the `--color` value: `always`, `never` or `auto`.
    /// `always` overrides `NO_COLOR`.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// `WriteStyle` for the `env_logger` backend.
    pub fn write_style(&self) -> env_logger::WriteStyle {
        if self.use_color {
            env_logger::WriteStyle::Always
        } else {
            env_logger::WriteStyle::Never
        }
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// A section heading, bold when colors are enabled.
pub fn heading(config: &OutputConfig, text: &str) -> String {
    if config.use_color {
        style(text).bold().to_string()
    } else {
        text.to_string()
    }
}

/// A status marker: `emoji` with colors, `plain` without.
pub fn marker<'a>(config: &OutputConfig, emoji: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji
    } else {
        plain
    }
}

/// The first `width` characters of `text`.
pub fn clip(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
