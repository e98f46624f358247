//! Resource exemption matching.
//!
//! # Matching Rules
//!
//! | Rule | Behaviour |
//! |------|-----------|
//! | **Anchoring** | Pattern must match the full resource path |
//! | **`*`** | Any sequence of characters except `/` |
//! | **`**`** | Any sequence of characters including `/` |
//! | **Literals** | Every other character, regex metacharacters included, matches itself |
//! | **Separators** | `\` in resource paths is treated as `/` |
//!
//! ```text
//! artifacts/**   → matches: artifacts/c.sig, artifacts/a/b/c.sig
//! artifacts/*    → matches: artifacts/c.sig
//!                → does NOT match: artifacts/a/b/c.sig
//! **/*.draft.sig → matches: specs/orders/v2.draft.sig
//! ```
//!
//! Patterns are compiled once into a [`RegexSet`] when a policy is loaded.

use std::borrow::Cow;

use regex::{Regex, RegexSet};

/// Compiled exemption patterns.
#[derive(Debug, Clone)]
pub struct ExemptionSet {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ExemptionSet {
    /// Compile a set of glob patterns. Patterns that fail to compile are
    /// skipped with a warning.
    pub fn new(patterns: &[impl AsRef<str>]) -> Self {
        let mut kept = Vec::with_capacity(patterns.len());
        let mut regexes = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let re = glob_to_regex(pattern);
            match Regex::new(&re) {
                Ok(_) => {
                    kept.push(pattern.to_string());
                    regexes.push(re);
                }
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "skipping exemption pattern");
                }
            }
        }

        let set = RegexSet::new(&regexes).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "exemption set too large, no paths will be exempt");
            kept.clear();
            RegexSet::empty()
        });

        Self {
            patterns: kept,
            set,
        }
    }

    /// An empty set that exempts nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::empty(),
        }
    }

    /// Whether `resource_path` matches any pattern.
    pub fn is_exempt(&self, resource_path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        self.set.is_match(&normalize_separators(resource_path))
    }

    /// Patterns that compiled.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ExemptionSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Check a path against uncompiled patterns.
///
/// Compiles on every call; hold an [`ExemptionSet`] when matching repeatedly.
pub fn is_exempt(patterns: &[impl AsRef<str>], resource_path: &str) -> bool {
    ExemptionSet::new(patterns).is_exempt(resource_path)
}

/// Translate a glob into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");
    for (i, part) in pattern.split("**").enumerate() {
        if i > 0 {
            out.push_str(".*");
        }
        for (j, literal) in part.split('*').enumerate() {
            if j > 0 {
                out.push_str("[^/]*");
            }
            out.push_str(&regex::escape(literal));
        }
    }
    out.push('$');
    out
}

fn normalize_separators(path: &str) -> Cow<'_, str> {
    if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    }
}
