//! Source backed by a local directory of provider packages.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{PackageLocation, PackageMeta, Platform, Source, SourceError, Version, VersionList};
use crate::addrs::Provider;
use crate::cache::scan::{ScannedPackage, scan_packages};

/// Serves packages from a directory in the same layout as a cache
/// directory, additionally accepting packed `.zip` archives next to the
/// version directories.
///
/// The directory is scanned once, on first use.
#[derive(Debug)]
pub struct FilesystemMirrorSource {
    base_dir: PathBuf,
    packages: OnceCell<Vec<ScannedPackage>>,
}

impl FilesystemMirrorSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            packages: OnceCell::new(),
        }
    }

    async fn packages(&self) -> Result<&[ScannedPackage], SourceError> {
        let packages = self
            .packages
            .get_or_try_init(|| async {
                let base = self.base_dir.clone();
                tokio::task::spawn_blocking(move || scan_packages(&base)).await.map_err(|e| {
                    SourceError::Io {
                        path: self.base_dir.display().to_string(),
                        message: e.to_string(),
                    }
                })
            })
            .await?;
        Ok(packages)
    }

    fn not_known(&self, provider: &Provider) -> SourceError {
        SourceError::ProviderNotKnown {
            provider: provider.clone(),
            origin: self.for_display(provider),
        }
    }
}

#[async_trait]
impl Source for FilesystemMirrorSource {
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError> {
        let mut versions: VersionList = self
            .packages()
            .await?
            .iter()
            .filter(|p| &p.provider == provider)
            .map(|p| p.version.clone())
            .collect();
        if versions.is_empty() {
            return Err(self.not_known(provider));
        }
        super::normalize_version_list(&mut versions);
        Ok(versions)
    }

    async fn package_meta(
        &self,
        provider: &Provider,
        version: &Version,
        target: &Platform,
    ) -> Result<PackageMeta, SourceError> {
        let packages = self.packages().await?;
        let for_provider: Vec<&ScannedPackage> =
            packages.iter().filter(|p| &p.provider == provider).collect();
        if for_provider.is_empty() {
            return Err(self.not_known(provider));
        }

        // prefer an unpacked directory over an archive of the same package
        let mut candidates: Vec<&ScannedPackage> = for_provider
            .iter()
            .copied()
            .filter(|p| &p.version == version && &p.platform == target)
            .collect();
        candidates.sort_by_key(|p| !p.is_unpacked());

        if let Some(found) = candidates.first() {
            let filename = match &found.location {
                PackageLocation::LocalArchive(path) => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                _ => PackageMeta::archive_filename(provider, version, target),
            };
            return Ok(PackageMeta {
                provider: provider.clone(),
                version: version.clone(),
                target_platform: target.clone(),
                filename,
                location: found.location.clone(),
                hashes: Vec::new(),
            });
        }

        let mut supported: Vec<Platform> = for_provider
            .iter()
            .filter(|p| &p.version == version)
            .map(|p| p.platform.clone())
            .collect();
        supported.sort();
        supported.dedup();
        Err(SourceError::PlatformNotSupported {
            provider: provider.clone(),
            version: version.clone(),
            platform: target.clone(),
            supported,
        })
    }

    fn for_display(&self, _provider: &Provider) -> String {
        self.base_dir.display().to_string()
    }
}
