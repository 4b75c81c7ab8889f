//! Provider package fixtures.
//!
//! A [`PackageFixture`] describes one provider package (address, version,
//! platform and executable contents) and can materialize it in any of the
//! layouts the crate reads: a zip archive, an unpacked cache directory, or
//! the packed layout of a filesystem mirror.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::addrs::Provider;
use crate::cache::{executable_name, package_dir_in};
use crate::installer::{InstallerEvents, ProviderInstallError};
use crate::source::hash::package_hash_v1_dir;
use crate::source::{
    PackageHash, PackageLocation, PackageMeta, Platform, Version, VersionConstraints, parse_version,
};

#[derive(Clone, Debug)]
pub struct PackageFixture {
    pub provider: Provider,
    pub version: Version,
    pub platform: Platform,
    pub content: String,
}

impl PackageFixture {
    /// A package for `provider` (any accepted source string), `version` and
    /// `platform` (`os_arch`).
    pub fn new(provider: &str, version: &str, platform: &str) -> Result<Self> {
        let provider: Provider = provider.parse().with_context(|| format!("fixture provider {provider}"))?;
        let version = parse_version(version)?;
        let platform = Platform::parse(platform)?;
        let content = format!("#!/bin/sh\necho {provider} {version}\n");
        Ok(Self {
            provider,
            version,
            platform,
            content,
        })
    }

    /// Replace the executable contents, producing a different hash.
    #[must_use]
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    #[must_use]
    pub fn archive_filename(&self) -> String {
        PackageMeta::archive_filename(&self.provider, &self.version, &self.platform)
    }

    /// Write the package as a zip archive at `path`.
    pub fn write_archive_at(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut zip = ZipWriter::new(file);
        zip.start_file(executable_name(&self.provider, &self.platform), SimpleFileOptions::default())?;
        zip.write_all(self.content.as_bytes())?;
        zip.finish()?;
        Ok(path.to_path_buf())
    }

    /// Write the archive into a filesystem mirror's packed layout under
    /// `mirror`, i.e. `<host>/<namespace>/<type>/<archive>.zip`.
    pub fn write_packed(&self, mirror: &Path) -> Result<PathBuf> {
        let path = mirror
            .join(self.provider.hostname.as_str())
            .join(&self.provider.namespace)
            .join(&self.provider.type_name)
            .join(self.archive_filename());
        self.write_archive_at(&path)
    }

    /// Write the package unpacked into the cache layout under `base`.
    pub fn write_unpacked(&self, base: &Path) -> Result<PathBuf> {
        let dir = package_dir_in(base, &self.provider, &self.version, &self.platform);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(executable_name(&self.provider, &self.platform)), &self.content)?;
        Ok(dir)
    }

    /// Metadata pointing at an archive written by [`Self::write_archive_at`].
    #[must_use]
    pub fn archive_meta(&self, archive: &Path) -> PackageMeta {
        PackageMeta {
            provider: self.provider.clone(),
            version: self.version.clone(),
            target_platform: self.platform.clone(),
            filename: self.archive_filename(),
            location: PackageLocation::LocalArchive(archive.to_path_buf()),
            hashes: Vec::new(),
        }
    }

    /// The `h1:` hash this package has once installed.
    pub fn h1_hash(&self) -> Result<PackageHash> {
        let temp = tempfile::TempDir::new()?;
        let dir = self.write_unpacked(temp.path())?;
        Ok(package_hash_v1_dir(&dir)?)
    }
}

/// [`InstallerEvents`] implementation that records every event as a line
/// of text, e.g. `fetch-begin registry.terraform.io/hashicorp/null 2.1.0`.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events starting with `kind`.
    pub fn of_kind(&self, kind: &str) -> Vec<String> {
        self.events().into_iter().filter(|e| e.split(' ').next() == Some(kind)).collect()
    }

    fn record(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl InstallerEvents for RecordingEvents {
    fn builtin_provider_available(&self, provider: &Provider) {
        self.record(format!("builtin {provider}"));
    }

    fn provider_already_installed(&self, provider: &Provider, version: &Version) {
        self.record(format!("already-installed {provider} {version}"));
    }

    fn querying_available_versions(&self, provider: &Provider) {
        self.record(format!("querying {provider}"));
    }

    fn selected_version(&self, provider: &Provider, version: &Version, from_lock: bool) {
        let origin = if from_lock { "lock" } else { "source" };
        self.record(format!("selected {provider} {version} {origin}"));
    }

    fn query_failed(&self, provider: &Provider, _constraints: &VersionConstraints, _err: &ProviderInstallError) {
        self.record(format!("query-failed {provider}"));
    }

    fn fetch_begin(&self, provider: &Provider, version: &Version, _location: &PackageLocation) {
        self.record(format!("fetch-begin {provider} {version}"));
    }

    fn linked_from_global_cache(&self, provider: &Provider, version: &Version, _from: &Path) {
        self.record(format!("linked {provider} {version}"));
    }

    fn fetch_success(&self, provider: &Provider, version: &Version, _hash: &PackageHash) {
        self.record(format!("fetch-success {provider} {version}"));
    }

    fn fetch_failure(&self, provider: &Provider, version: &Version, _err: &ProviderInstallError) {
        self.record(format!("fetch-failure {provider} {version}"));
    }
}
