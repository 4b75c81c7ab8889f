//! Provider requirements gathered from configuration and persisted state.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use thiserror::Error;

use crate::addrs::{AddrError, Provider, parse_provider_source};
use crate::source::{ParseError, VersionConstraints};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    #[error("invalid provider in requirement {given:?}: {source}")]
    Address {
        given: String,
        source: AddrError,
    },

    #[error("invalid version constraints in requirement {given:?}: {source}")]
    Constraints {
        given: String,
        source: ParseError,
    },
}

/// Version constraints per provider.
///
/// Requirements from several origins are combined by union: adding
/// constraints for a provider that already has some keeps both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements(BTreeMap<Provider, VersionConstraints>);

impl Requirements {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, provider: Provider, constraints: VersionConstraints) {
        match self.0.entry(provider) {
            Entry::Occupied(mut existing) => {
                let merged = existing.get().merge(&constraints);
                existing.insert(merged);
            }
            Entry::Vacant(slot) => {
                slot.insert(constraints);
            }
        }
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (provider, constraints) in &other.0 {
            self.add(provider.clone(), constraints.clone());
        }
    }

    #[must_use]
    pub fn get(&self, provider: &Provider) -> Option<&VersionConstraints> {
        self.0.get(provider)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Provider, &VersionConstraints)> {
        self.0.iter()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.0.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Provider, VersionConstraints)> for Requirements {
    fn from_iter<I: IntoIterator<Item = (Provider, VersionConstraints)>>(iter: I) -> Self {
        let mut reqs = Self::new();
        for (provider, constraints) in iter {
            reqs.add(provider, constraints);
        }
        reqs
    }
}

/// Parse `ADDR` or `ADDR=CONSTRAINTS`, e.g. `hashicorp/null=>= 2.0.0, < 3.0.0`.
pub fn parse_requirement(given: &str) -> Result<(Provider, VersionConstraints), RequirementError> {
    let (addr, constraints) = given.split_once('=').unwrap_or((given, ""));
    let provider = parse_provider_source(addr.trim()).map_err(|source| RequirementError::Address {
        given: given.to_string(),
        source,
    })?;
    let constraints =
        VersionConstraints::parse(constraints).map_err(|source| RequirementError::Constraints {
            given: given.to_string(),
            source,
        })?;
    Ok((provider, constraints))
}
