//! In-memory source for tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PackageLocation, PackageMeta, Platform, Source, SourceError, Version, VersionList};
use crate::addrs::Provider;

/// One recorded call against a [`MockSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    AvailableVersions(Provider),
    PackageMeta(Provider, Version, Platform),
}

/// A source that answers from a fixed list of packages and records every
/// call it receives.
#[derive(Debug, Default)]
pub struct MockSource {
    packages: Vec<PackageMeta>,
    errors: HashMap<Provider, SourceError>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockSource {
    #[must_use]
    pub fn new(packages: Vec<PackageMeta>) -> Self {
        Self {
            packages,
            ..Self::default()
        }
    }

    /// Make every query for `provider` fail with `err`.
    #[must_use]
    pub fn with_error(mut self, provider: Provider, err: SourceError) -> Self {
        self.errors.insert(provider, err);
        self
    }

    /// Snapshot of the calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Metadata for a package that exists only on paper. Installing it
    /// fails; use it for tests that stop before fetching.
    #[must_use]
    pub fn fake_package_meta(provider: &Provider, version: &Version, target: &Platform) -> PackageMeta {
        let filename = PackageMeta::archive_filename(provider, version, target);
        PackageMeta {
            provider: provider.clone(),
            version: version.clone(),
            target_platform: target.clone(),
            location: PackageLocation::LocalArchive(PathBuf::from("/fake-archive").join(&filename)),
            filename,
            hashes: Vec::new(),
        }
    }
}

#[async_trait]
impl Source for MockSource {
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError> {
        self.record(MockCall::AvailableVersions(provider.clone()));
        if let Some(err) = self.errors.get(provider) {
            return Err(err.clone());
        }

        let mut versions: VersionList = self
            .packages
            .iter()
            .filter(|p| &p.provider == provider)
            .map(|p| p.version.clone())
            .collect();
        if versions.is_empty() {
            return Err(SourceError::ProviderNotKnown {
                provider: provider.clone(),
                origin: self.for_display(provider),
            });
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
        self.record(MockCall::PackageMeta(provider.clone(), version.clone(), target.clone()));
        if let Some(err) = self.errors.get(provider) {
            return Err(err.clone());
        }

        let mut supported = Vec::new();
        for pkg in self.packages.iter().filter(|p| &p.provider == provider) {
            if &pkg.version != version {
                continue;
            }
            if &pkg.target_platform == target {
                return Ok(pkg.clone());
            }
            supported.push(pkg.target_platform.clone());
        }

        if !self.packages.iter().any(|p| &p.provider == provider) {
            return Err(SourceError::ProviderNotKnown {
                provider: provider.clone(),
                origin: self.for_display(provider),
            });
        }
        supported.sort();
        Err(SourceError::PlatformNotSupported {
            provider: provider.clone(),
            version: version.clone(),
            platform: target.clone(),
            supported,
        })
    }

    fn for_display(&self, _provider: &Provider) -> String {
        "mock source".to_string()
    }
}
