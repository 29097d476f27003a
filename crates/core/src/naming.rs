//! File-name conventions: probable copies and transient editor/OS files.

use regex::{RegexSet, RegexSetBuilder};

/// Name fragments left behind by "duplicate file" actions and sync clients.
const COPY_PATTERNS: &[&str] = &[r" - Copy", r" - Kopie", r"\(\d+\)", r"MacBook"];

const TRANSIENT_PREFIXES: &[&str] = &["~$", "._", ".sb-"];
const TRANSIENT_SUFFIXES: &[&str] = &[".tmp", ".lock"];

/// Case-insensitive matcher for names that look like a copy of another file.
#[derive(Debug, Clone)]
pub struct CopyHeuristic {
    patterns: RegexSet,
}

impl CopyHeuristic {
    /// Built-in patterns plus `extra` regexes.
    pub fn with_extra(extra: &[String]) -> Result<Self, regex::Error> {
        let all = COPY_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(extra.iter().cloned());
        let patterns = RegexSetBuilder::new(all).case_insensitive(true).build()?;
        Ok(Self { patterns })
    }

    /// `name` is a basename; matching is by substring, not equality.
    pub fn is_copy_name(&self, name: &str) -> bool {
        self.patterns.is_match(name)
    }
}

impl Default for CopyHeuristic {
    fn default() -> Self {
        Self::with_extra(&[]).expect("built-in copy patterns are valid")
    }
}

/// Office lock files, macOS resource forks, Sublime/atomic-save temp files
/// and generic `.tmp`/`.lock` files.
pub fn is_transient_name(name: &str) -> bool {
    TRANSIENT_PREFIXES.iter().any(|p| name.starts_with(p))
        || TRANSIENT_SUFFIXES.iter().any(|s| name.ends_with(s))
}
