//! Provider package sources.
//!
//! A [`Source`] is anything that can report which versions of a provider
//! exist and where to fetch the package for a given version and platform.
//! Origins are composed rather than special-cased:
//!
//! - [`FilesystemMirrorSource`] reads a local directory of packages
//! - [`HttpMirrorSource`] speaks the provider network mirror protocol
//! - [`MockSource`] is an in-memory double for tests
//! - [`MemoizeSource`] caches another source's answers for one run
//! - [`MultiSource`] combines several sources with include/exclude patterns
//!
//! # Error contract
//!
//! "Not known" and "platform not supported" are distinct [`SourceError`]
//! variants because [`MultiSource`] treats them differently: both are
//! recoverable by trying the next selector, but only the former is ignored
//! when collecting versions. Every other variant aborts the query.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::addrs::Provider;

pub mod filesystem_mirror;
pub mod hash;
pub mod http_mirror;
pub mod memoize;
pub mod mock;
pub mod multi;
pub mod types;

pub use filesystem_mirror::FilesystemMirrorSource;
pub use hash::{HashScheme, PackageHash};
pub use http_mirror::HttpMirrorSource;
pub use memoize::MemoizeSource;
pub use mock::{MockCall, MockSource};
pub use multi::{MultiSource, MultiSourceSelector, PatternError, ProviderPattern};
pub use types::{
    ConstraintOp, PackageLocation, PackageMeta, ParseError, Platform, Version, VersionConstraint,
    VersionConstraints, VersionList, normalize_version_list, parse_version,
};

/// Errors reported by a [`Source`].
///
/// Values are `Clone` so that [`MemoizeSource`] can hand the same cached
/// outcome to every caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("provider {provider} is not available from {origin}")]
    ProviderNotKnown {
        provider: Provider,
        origin: String,
    },

    #[error("provider {provider} {version} is not available for {platform}")]
    PlatformNotSupported {
        provider: Provider,
        version: Version,
        platform: Platform,
        /// Platforms the origin does offer for this version, when it said so.
        supported: Vec<Platform>,
    },

    #[error("failed to query {url}: {message}")]
    Http {
        url: String,
        message: String,
    },

    #[error("invalid response from {origin}: {message}")]
    InvalidResponse {
        origin: String,
        message: String,
    },

    #[error("failed to read {path}: {message}")]
    Io {
        path: String,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl SourceError {
    #[must_use]
    pub fn is_not_known(&self) -> bool {
        matches!(self, Self::ProviderNotKnown { .. })
    }

    #[must_use]
    pub fn is_platform_not_supported(&self) -> bool {
        matches!(self, Self::PlatformNotSupported { .. })
    }
}

/// An origin of provider packages.
///
/// Implementations must be safe to call repeatedly. Concurrent calls are
/// allowed by the `Send + Sync` bound, but an implementation is free to
/// repeat work under concurrency; wrap it in [`MemoizeSource`] for
/// single-flight behavior.
#[async_trait]
pub trait Source: Send + Sync {
    /// All versions of `provider` this source offers, ascending, without
    /// duplicates. Versions may exist for platforms other than the current
    /// one.
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError>;

    /// Location and known hashes of one package.
    async fn package_meta(
        &self,
        provider: &Provider,
        version: &Version,
        target: &Platform,
    ) -> Result<PackageMeta, SourceError>;

    /// Human-readable description of where this source looks for `provider`.
    fn for_display(&self, provider: &Provider) -> String;
}

#[async_trait]
impl<S: Source + ?Sized> Source for Arc<S> {
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError> {
        (**self).available_versions(provider).await
    }

    async fn package_meta(
        &self,
        provider: &Provider,
        version: &Version,
        target: &Platform,
    ) -> Result<PackageMeta, SourceError> {
        (**self).package_meta(provider, version, target).await
    }

    fn for_display(&self, provider: &Provider) -> String {
        (**self).for_display(provider)
    }
}
