//! Per-run caching decorator for sources.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{PackageMeta, Platform, Source, SourceError, Version, VersionList};
use crate::addrs::Provider;

type Slot<T> = Arc<OnceCell<Result<T, SourceError>>>;

/// Caches the answers of another source for the lifetime of one resolution
/// run.
///
/// The first query per key is forwarded and its outcome, success or error,
/// is kept. Concurrent first queries for the same key wait on a shared
/// [`OnceCell`], so the underlying source sees exactly one call per key.
/// Cancellation is the only outcome not cached; a later caller retries.
///
/// Build a fresh instance per run. Entries never expire.
pub struct MemoizeSource<S> {
    underlying: S,
    versions: DashMap<Provider, Slot<VersionList>>,
    metas: DashMap<(Provider, Version, Platform), Slot<PackageMeta>>,
}

impl<S: Source> MemoizeSource<S> {
    pub fn new(underlying: S) -> Self {
        Self {
            underlying,
            versions: DashMap::new(),
            metas: DashMap::new(),
        }
    }

    pub fn underlying(&self) -> &S {
        &self.underlying
    }
}

/// Resolve `slot`, leaving it empty if the computation was cancelled.
async fn resolve<T, F>(slot: Slot<T>, compute: F) -> Result<T, SourceError>
where
    T: Clone,
    F: std::future::Future<Output = Result<T, SourceError>>,
{
    let cached = slot
        .get_or_try_init(move || async move {
            match compute.await {
                Err(SourceError::Cancelled) => Err(SourceError::Cancelled),
                outcome => Ok(outcome),
            }
        })
        .await?;
    cached.clone()
}

#[async_trait]
impl<S: Source> Source for MemoizeSource<S> {
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError> {
        let slot = self.versions.entry(provider.clone()).or_default().clone();
        if slot.initialized() {
            debug!(target: "provman::source", "memoized versions for {provider}");
        }
        resolve(slot, self.underlying.available_versions(provider)).await
    }

    async fn package_meta(
        &self,
        provider: &Provider,
        version: &Version,
        target: &Platform,
    ) -> Result<PackageMeta, SourceError> {
        let key = (provider.clone(), version.clone(), target.clone());
        let slot = self.metas.entry(key).or_default().clone();
        resolve(slot, self.underlying.package_meta(provider, version, target)).await
    }

    fn for_display(&self, provider: &Provider) -> String {
        self.underlying.for_display(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MockCall, MockSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn provider() -> Provider {
        Provider::new_default("ns", "test").unwrap()
    }

    #[tokio::test]
    async fn test_caches_success() {
        let linux = Platform::new("linux", "amd64");
        let meta = MockSource::fake_package_meta(&provider(), &Version::new(1, 0, 0), &linux);
        let source = MemoizeSource::new(MockSource::new(vec![meta.clone()]));

        for _ in 0..3 {
            let versions = source.available_versions(&provider()).await.unwrap();
            assert_eq!(versions, vec![Version::new(1, 0, 0)]);
            let got = source.package_meta(&provider(), &Version::new(1, 0, 0), &linux).await;
            assert_eq!(got.unwrap(), meta);
        }

        assert_eq!(
            source.underlying().calls(),
            vec![
                MockCall::AvailableVersions(provider()),
                MockCall::PackageMeta(provider(), Version::new(1, 0, 0), linux),
            ]
        );
    }

    #[tokio::test]
    async fn test_caches_errors() {
        let err = SourceError::Http {
            url: "https://example.com".to_string(),
            message: "boom".to_string(),
        };
        let source =
            MemoizeSource::new(MockSource::default().with_error(provider(), err.clone()));

        for _ in 0..3 {
            assert_eq!(source.available_versions(&provider()).await.unwrap_err(), err);
        }
        assert_eq!(source.underlying().call_count(), 1);
    }

    #[tokio::test]
    async fn test_caches_not_known() {
        let source = MemoizeSource::new(MockSource::default());
        assert!(source.available_versions(&provider()).await.unwrap_err().is_not_known());
        assert!(source.available_versions(&provider()).await.unwrap_err().is_not_known());
        assert_eq!(source.underlying().call_count(), 1);
    }

    struct SlowSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Source for SlowSource {
        async fn available_versions(&self, _: &Provider) -> Result<VersionList, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![Version::new(1, 0, 0)])
        }

        async fn package_meta(
            &self,
            provider: &Provider,
            _: &Version,
            _: &Platform,
        ) -> Result<PackageMeta, SourceError> {
            Err(SourceError::ProviderNotKnown {
                provider: provider.clone(),
                origin: "slow".to_string(),
            })
        }

        fn for_display(&self, _: &Provider) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_access_single_flight() {
        let source = Arc::new(MemoizeSource::new(SlowSource {
            calls: AtomicUsize::new(0),
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = Arc::clone(&source);
                tokio::spawn(async move { source.available_versions(&provider()).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(source.underlying().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_not_cached() {
        let source =
            MemoizeSource::new(MockSource::default().with_error(provider(), SourceError::Cancelled));
        assert_eq!(
            source.available_versions(&provider()).await.unwrap_err(),
            SourceError::Cancelled
        );
        assert_eq!(
            source.available_versions(&provider()).await.unwrap_err(),
            SourceError::Cancelled
        );
        assert_eq!(source.underlying().call_count(), 2);
    }
}
