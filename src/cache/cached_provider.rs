use std::path::{Path, PathBuf};

use crate::addrs::Provider;
use crate::constants::PROVIDER_EXECUTABLE_PREFIX;
use crate::source::hash::{PackageHash, package_hash_v1_dir, package_matches_any};
use crate::source::{PackageLocation, PackageMeta, Platform, Version};

/// A provider package unpacked in a cache directory for one platform.
///
/// Derived from a filesystem scan, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedProvider {
    pub provider: Provider,
    pub version: Version,
    pub package_dir: PathBuf,
    pub executable_file: PathBuf,
}

impl CachedProvider {
    /// Describe an unpacked package directory.
    pub(crate) fn from_package_dir(
        provider: Provider,
        version: Version,
        platform: &Platform,
        package_dir: PathBuf,
    ) -> Self {
        let executable_file = find_executable(&package_dir, &provider, platform);
        Self {
            provider,
            version,
            package_dir,
            executable_file,
        }
    }

    /// `h1:` hash of the package contents.
    pub fn hash(&self) -> std::io::Result<PackageHash> {
        package_hash_v1_dir(&self.package_dir)
    }

    /// Whether the package matches any of `hashes`.
    pub fn matches_any_hash(&self, hashes: &[PackageHash]) -> std::io::Result<bool> {
        package_matches_any(&self.package_dir, false, hashes)
    }

    /// Metadata for installing this package somewhere else.
    #[must_use]
    pub fn package_meta(&self, platform: &Platform) -> PackageMeta {
        PackageMeta {
            provider: self.provider.clone(),
            version: self.version.clone(),
            target_platform: platform.clone(),
            filename: PackageMeta::archive_filename(&self.provider, &self.version, platform),
            location: PackageLocation::LocalDir(self.package_dir.clone()),
            hashes: Vec::new(),
        }
    }
}

/// Conventional executable name inside a package directory.
#[must_use]
pub fn executable_name(provider: &Provider, platform: &Platform) -> String {
    let suffix = if platform.is_windows() { ".exe" } else { "" };
    format!("{PROVIDER_EXECUTABLE_PREFIX}{}{suffix}", provider.type_name)
}

/// The conventional executable if present; otherwise the first file whose
/// name starts with `terraform-provider-<type>`. Falls back to the
/// conventional path even when it does not exist, so callers get a
/// predictable error when running it.
fn find_executable(package_dir: &Path, provider: &Provider, platform: &Platform) -> PathBuf {
    let conventional = package_dir.join(executable_name(provider, platform));
    if conventional.is_file() {
        return conventional;
    }

    let prefix = format!("{PROVIDER_EXECUTABLE_PREFIX}{}", provider.type_name);
    let Ok(entries) = std::fs::read_dir(package_dir) else {
        return conventional;
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .collect();
    candidates.sort();
    candidates.into_iter().next().unwrap_or(conventional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_executable_name() {
        let null = Provider::new_default("hashicorp", "null").unwrap();
        assert_eq!(
            executable_name(&null, &Platform::new("windows", "amd64")),
            "terraform-provider-null.exe"
        );
        assert_eq!(
            executable_name(&null, &Platform::new("linux", "amd64")),
            "terraform-provider-null"
        );
    }

    #[test]
    fn test_versioned_executable_fallback() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("terraform-provider-null_v2.1.0_x4"), "bin").unwrap();
        std::fs::write(temp.path().join("README.md"), "docs").unwrap();

        let cached = CachedProvider::from_package_dir(
            Provider::new_default("hashicorp", "null").unwrap(),
            Version::new(2, 1, 0),
            &Platform::new("linux", "amd64"),
            temp.path().to_path_buf(),
        );
        assert_eq!(cached.executable_file, temp.path().join("terraform-provider-null_v2.1.0_x4"));
    }
}
