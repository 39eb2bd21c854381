//! # Error Suggestions
//!
//! This module provides helper functions for generating helpful error
//! messages with hints and suggestions. Errors should tell users what went
//! wrong AND how to fix it.
//!
//! It also hosts the "close matches" computation used when a requested
//! layer, distro, machine, recipe or template is not found in any index.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wrlinux_setup::suggestions;
//!
//! // Instead of:
//! anyhow::bail!("Unable to determine base url");
//!
//! // Use:
//! return Err(suggestions::missing_base_url());
//! ```

use std::path::Path;

/// Similarity (0.0 to 1.0) a candidate needs to count as a close match.
pub const CLOSE_MATCH_CUTOFF: f64 = 0.6;

/// Maximum number of close matches reported.
pub const CLOSE_MATCH_LIMIT: usize = 3;

/// Generate an error for when the settings file is not found.
pub fn settings_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Settings file not found: {path}\n\n\
         hint: Omit --settings to use the built-in wrlinux settings\n\
         hint: Set WRLINUX_SETUP_SETTINGS to point at a settings file",
        path = path.display()
    )
}

/// Generate an error for a missing base URL.
pub fn missing_base_url() -> anyhow::Error {
    anyhow::anyhow!(
        "Unable to determine base url\n\n\
         hint: Pass --base-url=<URL>\n\
         hint: Set the OE_BASEURL environment variable"
    )
}

/// Generate an error for a missing base branch.
pub fn missing_base_branch() -> anyhow::Error {
    anyhow::anyhow!(
        "Unable to determine base branch\n\n\
         hint: Pass --base-branch=<BRANCH>\n\
         hint: Set the OE_BASEBRANCH environment variable"
    )
}

/// Generate an error for when every configured index was dropped.
pub fn no_usable_index() -> anyhow::Error {
    anyhow::anyhow!(
        "No usable layer index could be loaded\n\n\
         hint: Check network access to the configured index URLs\n\
         hint: Use --mirror-index <DIR> to load a local snapshot\n\
         hint: Run with --log-level debug to see why each index was dropped"
    )
}

/// Generate an error for an invalid download-layer regex.
///
/// Includes hints about common regex mistakes.
pub fn invalid_regex(pattern: &str, error: &regex::Error) -> anyhow::Error {
    let hint = match error {
        regex::Error::Syntax(msg) if msg.contains("unclosed") => {
            "hint: Check for unclosed brackets, parentheses, or braces"
        }
        regex::Error::Syntax(msg) if msg.contains("repetition") => {
            "hint: Repetition operators (+, *, ?) must follow a pattern"
        }
        _ => "hint: Check download_pattern in your settings file",
    };

    anyhow::anyhow!(
        "Invalid regex pattern: {pattern}\n\
         error: {error}\n\n\
         {hint}\n\
         hint: Test patterns at https://regex101.com (select Rust flavor)"
    )
}

/// Generate an error for an invalid extra-group glob pattern.
pub fn invalid_glob(pattern: &str, error: &glob::PatternError) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid layer group pattern: {pattern}\n\
         error: {error}\n\n\
         hint: Use * to match any run of characters in a layer name\n\
         hint: Use [abc] for character classes, [!abc] to negate"
    )
}

/// Generate an error for an unknown index source type.
///
/// Includes the list of valid types.
pub fn unknown_source_type(kind: &str) -> anyhow::Error {
    let valid_types = ["restapi-web", "restapi-files", "export"];

    let suggestion = find_similar(kind, &valid_types);
    let did_you_mean = suggestion
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();

    anyhow::anyhow!(
        "Unknown index type: {kind}{did_you_mean}\n\n\
         Valid index types are: {types}",
        types = valid_types.join(", ")
    )
}

/// Find the known values most similar to `input`.
///
/// Similarity is `1 - distance / max_len` over the Levenshtein distance.
/// Candidates at or above `cutoff` are returned best first, at most `limit`
/// of them, without duplicates.
pub fn close_matches<'a, I>(input: &str, candidates: I, limit: usize, cutoff: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = Vec::new();
    for candidate in candidates {
        if scored.iter().any(|(_, seen)| *seen == candidate) {
            continue;
        }
        let score = similarity(input, candidate);
        if score >= cutoff {
            scored.push((score, candidate));
        }
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in matrix[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=a_len {
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] {
                0
            } else {
                1
            };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }

    matrix[a_len][b_len]
}
