//! Choosing a version from those a source offers.

use serde::{Deserialize, Serialize};

use crate::source::{Version, VersionConstraints};

/// How ties between acceptable versions are broken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Always the newest acceptable version.
    #[default]
    Newest,
    /// The newest acceptable version already in the cache, if any, to avoid
    /// a fetch; otherwise the newest acceptable version.
    PreferCached,
}

/// Pick a version from `available` that satisfies `constraints`.
#[must_use]
pub fn select_version(
    available: &[Version],
    constraints: &VersionConstraints,
    cached: &[Version],
    policy: SelectionPolicy,
) -> Option<Version> {
    let newest = constraints.newest_allowed(available)?;
    if policy == SelectionPolicy::PreferCached {
        let cached_match =
            available.iter().filter(|v| cached.contains(v) && constraints.allows(v)).max();
        if let Some(v) = cached_match {
            return Some(v.clone());
        }
    }
    Some(newest.clone())
}

/// The newest `limit` release versions, newest first, for error messages.
#[must_use]
pub fn closest_versions(available: &[Version], limit: usize) -> Vec<Version> {
    let mut releases: Vec<Version> = available.iter().filter(|v| v.pre.is_empty()).cloned().collect();
    releases.sort_unstable_by(|a, b| b.cmp(a));
    releases.truncate(limit);
    releases
}
