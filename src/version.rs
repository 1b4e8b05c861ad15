// src/version.rs

//! Version ordering for provider documents
//!
//! Composer version strings come in three flavors: plain semver
//! ("1.2.3"), prefixed/suffixed variants ("v1.2.3", "1.2.3-beta2"),
//! and branch aliases ("dev-main", "2.x-dev"). Provider documents list
//! versions strictly descending by semantic precedence; strings that
//! do not parse as semver sort after everything that does, keeping
//! their insertion order among themselves.

use semver::Version;
use std::cmp::Ordering;

/// Sort key for one version string within a package listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey {
    parsed: Option<Version>,
    /// Insertion index, used as a stable tiebreaker for unparseable strings
    index: usize,
}

impl VersionKey {
    /// Build a key from a raw version string and its insertion index
    ///
    /// Accepts an optional leading "v" and pads incomplete numeric
    /// versions ("1.2" → "1.2.0") before handing off to semver.
    pub fn new(raw: &str, index: usize) -> Self {
        Self {
            parsed: parse_lenient(raw),
            index,
        }
    }

    /// Whether the string parsed as a semantic version
    pub fn is_semver(&self) -> bool {
        self.parsed.is_some()
    }

    /// Descending comparison for listing order (highest precedence first)
    pub fn listing_cmp(&self, other: &Self) -> Ordering {
        match (&self.parsed, &other.parsed) {
            (Some(a), Some(b)) => b.cmp(a),
            // Parseable versions come before unparseable ones
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.index.cmp(&other.index),
        }
    }
}

fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');

    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    // Pad "1" or "1.2" style versions, preserving any -pre/+build tail
    let (core, tail) = match trimmed.find(['-', '+']) {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };

    let dots = core.chars().filter(|c| *c == '.').count();
    if dots < 2 && !core.is_empty() && core.chars().all(|c| c.is_ascii_digit() || c == '.') {
        let padded = match dots {
            0 => format!("{core}.0.0{tail}"),
            _ => format!("{core}.0{tail}"),
        };
        return Version::parse(&padded).ok();
    }

    None
}

/// Classify a version string as belonging to the dev channel
///
/// Composer's convention: branch versions are either "dev-" prefixed
/// (named branches) or "-dev" suffixed (numeric branch aliases like
/// "2.x-dev"). Everything else is a tagged, stable-channel version.
pub fn is_dev_version(version: &str) -> bool {
    version.starts_with("dev-") || version.ends_with("-dev")
}

/// Sort version strings into provider-document listing order
///
/// Strictly descending by semantic precedence; non-semver strings go
/// last, stable by insertion order.
pub fn sort_for_listing<T, F>(items: &mut [T], version_of: F)
where
    F: Fn(&T) -> &str,
{
    let keys: Vec<VersionKey> = items
        .iter()
        .enumerate()
        .map(|(i, item)| VersionKey::new(version_of(item), i))
        .collect();

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| keys[a].listing_cmp(&keys[b]));

    // Apply the permutation
    let mut pos: Vec<usize> = vec![0; order.len()];
    for (target, &source) in order.iter().enumerate() {
        pos[source] = target;
    }
    for i in 0..items.len() {
        while pos[i] != i {
            let j = pos[i];
            items.swap(i, j);
            pos.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(input: &[&str]) -> Vec<String> {
        let mut items: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        sort_for_listing(&mut items, |s| s.as_str());
        items
    }

    #[test]
    fn test_descending_semver_order() {
        let result = sorted(&["1.0.0", "2.1.0", "2.0.0"]);
        assert_eq!(result, vec!["2.1.0", "2.0.0", "1.0.0"]);
    }

    #[test]
    fn test_release_beats_prerelease() {
        let result = sorted(&["1.0.0-beta1", "1.0.0", "1.0.0-alpha"]);
        assert_eq!(result, vec!["1.0.0", "1.0.0-beta1", "1.0.0-alpha"]);
    }

    #[test]
    fn test_v_prefix_and_short_versions() {
        let result = sorted(&["v1.2", "1.10.0", "1.2.1"]);
        assert_eq!(result, vec!["1.10.0", "1.2.1", "v1.2"]);
    }

    #[test]
    fn test_non_semver_sorts_last_stable() {
        let result = sorted(&["dev-main", "1.0.0", "dev-feature", "2.0.0"]);
        assert_eq!(result, vec!["2.0.0", "1.0.0", "dev-main", "dev-feature"]);
    }

    #[test]
    fn test_dev_version_classification() {
        assert!(is_dev_version("dev-main"));
        assert!(is_dev_version("2.x-dev"));
        assert!(!is_dev_version("1.0.0"));
        assert!(!is_dev_version("1.0.0-beta1"));
    }
}
