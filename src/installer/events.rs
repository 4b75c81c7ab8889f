//! Progress callbacks emitted while installing providers.
//!
//! The installer reports what it is doing through [`InstallerEvents`] and
//! never renders anything itself. Every method has an empty default body,
//! so an implementation only overrides the events it cares about.
//! Callbacks may arrive concurrently from different providers.

use std::path::Path;

use super::ProviderInstallError;
use crate::addrs::Provider;
use crate::source::{PackageHash, PackageLocation, Version, VersionConstraints};

pub trait InstallerEvents: Send + Sync {
    /// The providers about to be processed, in address order.
    fn pending_providers(&self, _providers: &[Provider]) {}

    /// A built-in provider was requested; nothing needs installing.
    fn builtin_provider_available(&self, _provider: &Provider) {}

    /// The locked version is already in the cache and was reused without
    /// consulting any source.
    fn provider_already_installed(&self, _provider: &Provider, _version: &Version) {}

    fn querying_available_versions(&self, _provider: &Provider) {}

    /// A version was chosen, either from the lock file or from the source.
    fn selected_version(&self, _provider: &Provider, _version: &Version, _from_lock: bool) {}

    fn query_failed(&self, _provider: &Provider, _constraints: &VersionConstraints, _err: &ProviderInstallError) {}

    fn fetch_begin(&self, _provider: &Provider, _version: &Version, _location: &PackageLocation) {}

    /// A package was copied from the global plugin cache.
    fn linked_from_global_cache(&self, _provider: &Provider, _version: &Version, _from: &Path) {}

    fn fetch_success(&self, _provider: &Provider, _version: &Version, _hash: &PackageHash) {}

    fn fetch_failure(&self, _provider: &Provider, _version: &Version, _err: &ProviderInstallError) {}

    /// Every provider has been processed; `failed` of them did not resolve.
    fn finished(&self, _installed: usize, _failed: usize) {}
}

/// Events sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl InstallerEvents for NoopEvents {}
