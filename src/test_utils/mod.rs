//! Test utilities for provman.
//!
//! Helpers shared by unit tests and the integration suite: logging setup,
//! provider package fixtures on disk, and an [`InstallerEvents`] recorder.
//!
//! [`InstallerEvents`]: crate::installer::InstallerEvents

pub mod fixtures;

pub use fixtures::{PackageFixture, RecordingEvents};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```rust,no_run
/// provman_cli::test_utils::init_test_logging(Some(tracing::Level::DEBUG));
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
