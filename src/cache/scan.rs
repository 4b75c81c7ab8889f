//! Reading provider packages out of a directory tree.
//!
//! Two layouts are recognized under a base directory:
//!
//! ```text
//! <hostname>/<namespace>/<type>/<version>/<os_arch>/          unpacked
//! <hostname>/<namespace>/<type>/terraform-provider-<type>_<version>_<os_arch>.zip   packed
//! ```
//!
//! Entries that do not fit either layout are skipped with a debug log. The
//! filesystem is the only source of truth; nothing is indexed on disk.

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::addrs::{Provider, parse_provider_source};
use crate::constants::PROVIDER_EXECUTABLE_PREFIX;
use crate::source::{PackageLocation, Platform, Version, parse_version};

/// One package found by [`scan_packages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPackage {
    pub provider: Provider,
    pub version: Version,
    pub platform: Platform,
    pub location: PackageLocation,
}

impl ScannedPackage {
    #[must_use]
    pub fn is_unpacked(&self) -> bool {
        matches!(self.location, PackageLocation::LocalDir(_))
    }
}

/// Find every package under `base_dir`, for all platforms, packed and
/// unpacked. A missing base directory yields an empty list.
#[must_use]
pub fn scan_packages(base_dir: &Path) -> Vec<ScannedPackage> {
    if !base_dir.is_dir() {
        return Vec::new();
    }

    let walker = WalkDir::new(base_dir)
        .min_depth(4)
        .max_depth(5)
        .follow_links(true)
        .sort_by_file_name();

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(target: "provman::cache", "skipping unreadable entry: {e}");
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(base_dir) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        // hidden top-level entries hold locks and staging areas
        if parts.first().is_some_and(|p| p.starts_with('.')) {
            continue;
        }

        let scanned = match (entry.depth(), entry.file_type().is_dir()) {
            (5, true) => unpacked_package(&parts, entry.path().to_path_buf()),
            (4, false) => packed_package(&parts, entry.path().to_path_buf()),
            _ => None,
        };
        match scanned {
            Some(pkg) => found.push(pkg),
            None if entry.depth() == 5 || !entry.file_type().is_dir() => {
                debug!(target: "provman::cache", "ignoring {}", entry.path().display());
            }
            None => {}
        }
    }
    found
}

fn provider_from_dirs(parts: &[String]) -> Option<Provider> {
    let source = format!("{}/{}/{}", parts[0], parts[1], parts[2]);
    let provider = parse_provider_source(&source).ok()?;
    // directory names must already be in canonical form
    (provider.to_string() == source).then_some(provider)
}

fn unpacked_package(parts: &[String], path: PathBuf) -> Option<ScannedPackage> {
    let provider = provider_from_dirs(parts)?;
    let version = parse_version(&parts[3]).ok()?;
    let platform = Platform::parse(&parts[4]).ok()?;
    if version.to_string() != parts[3] || platform.to_string() != parts[4] {
        return None;
    }
    Some(ScannedPackage {
        provider,
        version,
        platform,
        location: PackageLocation::LocalDir(path),
    })
}

fn packed_package(parts: &[String], path: PathBuf) -> Option<ScannedPackage> {
    let provider = provider_from_dirs(parts)?;
    let stem = parts[3].strip_suffix(".zip")?;
    let rest = stem.strip_prefix(PROVIDER_EXECUTABLE_PREFIX)?;
    let rest = rest.strip_prefix(provider.type_name.as_str())?.strip_prefix('_')?;

    let mut fields = rest.splitn(2, '_');
    let version = parse_version(fields.next()?).ok()?;
    let platform = Platform::parse(fields.next()?).ok()?;
    Some(ScannedPackage {
        provider,
        version,
        platform,
        location: PackageLocation::LocalArchive(path),
    })
}
