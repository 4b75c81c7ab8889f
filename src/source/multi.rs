//! Combining several sources into one, with include/exclude patterns.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::{PackageMeta, Platform, Source, SourceError, Version, VersionList};
use crate::addrs::{Hostname, Provider, parse_provider_part};
use crate::constants::WILDCARD;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("invalid provider matching pattern {given:?}: must have either two or three slash-separated segments")]
    SegmentCount {
        given: String,
    },

    #[error("invalid hostname in provider matching pattern {given:?}: {reason}")]
    InvalidHostname {
        given: String,
        reason: String,
    },

    #[error("invalid {segment} {value:?} in provider matching pattern {given:?}: must either be the wildcard * or a literal {segment}")]
    InvalidSegment {
        given: String,
        segment: &'static str,
        value: String,
    },

    #[error("invalid provider matching pattern {given:?}: hostname can be a wildcard only if both namespace and provider type are also wildcards")]
    HostnameWildcard {
        given: String,
    },

    #[error("invalid provider matching pattern {given:?}: namespace can be a wildcard only if the provider type is also a wildcard")]
    NamespaceWildcard {
        given: String,
    },
}

/// A provider address where each part may be a wildcard (`None`).
///
/// Wildcards are outermost-first: a wildcard hostname implies wildcard
/// namespace and type, and a wildcard namespace implies a wildcard type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPattern {
    pub hostname: Option<Hostname>,
    pub namespace: Option<String>,
    pub type_name: Option<String>,
}

impl ProviderPattern {
    /// Parse `[hostname/]namespace/type`, where any segment may be `*`.
    pub fn parse(given: &str) -> Result<Self, PatternError> {
        let parts: Vec<&str> = given.split('/').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(PatternError::SegmentCount {
                given: given.to_string(),
            });
        }

        let (hostname, rest) = if parts.len() == 3 {
            let host = if parts[0] == WILDCARD {
                None
            } else {
                Some(Hostname::parse(parts[0]).map_err(|e| PatternError::InvalidHostname {
                    given: given.to_string(),
                    reason: e.to_string(),
                })?)
            };
            (host, &parts[1..])
        } else {
            (Some(Hostname::default_registry()), &parts[..])
        };

        let segment = |value: &str, segment: &'static str| -> Result<Option<String>, PatternError> {
            if value == WILDCARD {
                return Ok(None);
            }
            parse_provider_part(value).map(Some).map_err(|_| PatternError::InvalidSegment {
                given: given.to_string(),
                segment,
                value: value.to_string(),
            })
        };
        let type_name = segment(rest[1], "provider type")?;
        let namespace = segment(rest[0], "namespace")?;

        if hostname.is_none() && (namespace.is_some() || type_name.is_some()) {
            return Err(PatternError::HostnameWildcard {
                given: given.to_string(),
            });
        }
        if namespace.is_none() && type_name.is_some() {
            return Err(PatternError::NamespaceWildcard {
                given: given.to_string(),
            });
        }

        Ok(Self {
            hostname,
            namespace,
            type_name,
        })
    }

    #[must_use]
    pub fn matches(&self, addr: &Provider) -> bool {
        self.hostname.as_ref().is_none_or(|h| h == &addr.hostname)
            && self.namespace.as_ref().is_none_or(|n| n == &addr.namespace)
            && self.type_name.as_ref().is_none_or(|t| t == &addr.type_name)
    }
}

impl FromStr for ProviderPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProviderPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: Option<&str>| p.unwrap_or(WILDCARD).to_string();
        write!(
            f,
            "{}/{}/{}",
            part(self.hostname.as_ref().map(Hostname::as_str)),
            part(self.namespace.as_deref()),
            part(self.type_name.as_deref())
        )
    }
}

/// Parse a list of pattern strings, failing on the first invalid one.
pub fn parse_patterns<S: AsRef<str>>(given: &[S]) -> Result<Vec<ProviderPattern>, PatternError> {
    given.iter().map(|s| ProviderPattern::parse(s.as_ref())).collect()
}

/// One entry of a [`MultiSource`].
#[derive(Clone)]
pub struct MultiSourceSelector {
    pub source: Arc<dyn Source>,
    pub include: Vec<ProviderPattern>,
    pub exclude: Vec<ProviderPattern>,
}

impl MultiSourceSelector {
    /// A selector that handles every provider.
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_include(mut self, patterns: Vec<ProviderPattern>) -> Self {
        self.include = patterns;
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, patterns: Vec<ProviderPattern>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Exclusions win; otherwise an empty include list admits everything.
    #[must_use]
    pub fn can_handle_provider(&self, addr: &Provider) -> bool {
        if self.exclude.iter().any(|p| p.matches(addr)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(addr))
    }
}

impl fmt::Debug for MultiSourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiSourceSelector")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .finish_non_exhaustive()
    }
}

/// An ordered list of selectors acting as a single [`Source`].
///
/// Versions are the union over every selector able to handle a provider.
/// Package metadata comes from the first selector, in list order, that
/// has the package.
#[derive(Debug, Clone, Default)]
pub struct MultiSource {
    selectors: Vec<MultiSourceSelector>,
}

impl MultiSource {
    #[must_use]
    pub fn new(selectors: Vec<MultiSourceSelector>) -> Self {
        Self { selectors }
    }

    #[must_use]
    pub fn selectors(&self) -> &[MultiSourceSelector] {
        &self.selectors
    }

    fn handling<'a>(&'a self, provider: &'a Provider) -> impl Iterator<Item = &'a MultiSourceSelector> {
        self.selectors.iter().filter(move |s| s.can_handle_provider(provider))
    }
}

#[async_trait]
impl Source for MultiSource {
    async fn available_versions(&self, provider: &Provider) -> Result<VersionList, SourceError> {
        let mut all = BTreeSet::new();
        for selector in self.handling(provider) {
            match selector.source.available_versions(provider).await {
                Ok(versions) => all.extend(versions),
                Err(e) if e.is_not_known() => {
                    debug!(target: "provman::source", "{} does not know {provider}", selector.source.for_display(provider));
                }
                Err(e) => return Err(e),
            }
        }

        if all.is_empty() {
            return Err(SourceError::ProviderNotKnown {
                provider: provider.clone(),
                origin: self.for_display(provider),
            });
        }
        Ok(all.into_iter().collect())
    }

    async fn package_meta(
        &self,
        provider: &Provider,
        version: &Version,
        target: &Platform,
    ) -> Result<PackageMeta, SourceError> {
        for selector in self.handling(provider) {
            match selector.source.package_meta(provider, version, target).await {
                Ok(meta) => return Ok(meta),
                Err(e) if e.is_not_known() || e.is_platform_not_supported() => {}
                Err(e) => return Err(e),
            }
        }

        Err(SourceError::PlatformNotSupported {
            provider: provider.clone(),
            version: version.clone(),
            platform: target.clone(),
            supported: Vec::new(),
        })
    }

    fn for_display(&self, provider: &Provider) -> String {
        let origins: Vec<String> =
            self.handling(provider).map(|s| s.source.for_display(provider)).collect();
        if origins.is_empty() {
            "no configured sources".to_string()
        } else {
            origins.join(", ")
        }
    }
}
