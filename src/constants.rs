//! Global constants used throughout the provman codebase.
//!
//! Hostnames, file names, and concurrency parameters that are shared by more
//! than one module live here so that magic values stay discoverable.

use std::time::Duration;

/// Registry host assumed when a provider address omits its hostname.
pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

/// Host that owns the built-in providers bundled with the tool itself.
pub const BUILTIN_PROVIDER_HOST: &str = "terraform.io";

/// Namespace reserved for built-in providers on [`BUILTIN_PROVIDER_HOST`].
pub const BUILTIN_PROVIDER_NAMESPACE: &str = "builtin";

/// Namespace marking a legacy, unqualified provider address.
///
/// Only valid together with [`DEFAULT_REGISTRY_HOST`].
pub const LEGACY_PROVIDER_NAMESPACE: &str = "-";

/// Wildcard token accepted in multi-source include/exclude patterns.
pub const WILDCARD: &str = "*";

/// Prefix of every provider executable and packed archive file name.
pub const PROVIDER_EXECUTABLE_PREFIX: &str = "terraform-provider-";

/// Default name of the dependency lock file.
pub const LOCK_FILE_NAME: &str = ".provman.lock.hcl";

/// Name of the command that maintains the lock file, quoted in its header.
pub const LOCK_FILE_MAINTAINER: &str = "provman install";

/// Timeout for a single HTTP request made by a network mirror source.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of retries for transient HTTP failures.
pub const HTTP_RETRY_ATTEMPTS: usize = 3;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Minimum number of providers resolved concurrently regardless of CPU count.
pub const MIN_PARALLELISM: usize = 4;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default concurrency for provider resolution.
#[must_use]
pub fn default_parallelism() -> usize {
    let cores = std::thread::available_parallelism().map_or(FALLBACK_CORE_COUNT, usize::from);
    (cores * PARALLELISM_CORE_MULTIPLIER).max(MIN_PARALLELISM)
}
