//! Provider addresses.
//!
//! A provider is identified by a `hostname/namespace/type` triple. This module
//! owns the parsing and normalization rules for that triple; everything that
//! persists an address (the lock file, the cache directory layout) relies on
//! [`Provider`]'s `Display` form being the single canonical spelling.

mod provider;

pub use provider::{
    AddrError, Hostname, Provider, is_lockable, parse_provider_part, parse_provider_source,
};
