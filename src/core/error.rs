//! Application-level errors and their user-facing rendering.
//!
//! Each component reports failures through its own closed enum
//! ([`InstallerError`], [`LockFileError`], [`CacheError`], [`SourceError`],
//! ...). Those are precise but written for programs. At the command line
//! boundary they are converted into a [`ProvmanError`] wrapped in an
//! [`ErrorContext`], which adds an actionable suggestion and optional
//! details, and is printed with colors by [`ErrorContext::display`].
//!
//! ```rust,no_run
//! use provman_cli::core::{ProvmanError, user_friendly_error};
//!
//! fn run() -> anyhow::Result<()> {
//!     Err(ProvmanError::Cancelled.into())
//! }
//!
//! if let Err(e) = run() {
//!     user_friendly_error(e).display();
//! }
//! ```

use std::fmt;

use colored::Colorize;
use thiserror::Error;

use crate::addrs::AddrError;
use crate::cache::CacheError;
use crate::installer::{InstallerError, RequirementError};
use crate::lockfile::LockFileError;
use crate::source::{PatternError, SourceError};

/// Errors presented to the user of the `provman` binary.
///
/// Variants carry plain strings so values can be cloned out of an
/// [`anyhow::Error`] chain when building an [`ErrorContext`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvmanError {
    /// A provider package did not match the checksums recorded in the lock
    /// file. This is always fatal: the package may have been tampered with.
    #[error("Checksum mismatch for {provider} {version} ({platform})")]
    ChecksumMismatch {
        provider: String,
        version: String,
        platform: String,
        expected: Vec<String>,
        actual: String,
    },

    /// The dependency lock file could not be decoded.
    #[error("Invalid lock file: {file}")]
    LockFileInvalid {
        file: String,
        problems: String,
    },

    /// The dependency lock file could not be read or written.
    #[error("Failed to access lock file {file}: {reason}")]
    LockFileIo {
        file: String,
        reason: String,
    },

    /// One or more providers could not be installed.
    #[error("Failed to install {count} provider(s)")]
    ProvidersFailed {
        count: usize,
        problems: String,
    },

    /// Installing only from local plugin directories and some required
    /// providers are not there.
    #[error("Providers not available in the plugin directories: {providers}")]
    ProvidersUnavailableOffline {
        providers: String,
        dirs: Vec<String>,
    },

    /// A `--require` argument could not be parsed.
    #[error("Invalid requirement '{given}': {reason}")]
    InvalidRequirement {
        given: String,
        reason: String,
    },

    /// A provider source address could not be parsed.
    #[error("Invalid provider address: {reason}")]
    InvalidProviderAddress {
        reason: String,
    },

    /// An `include`/`exclude` pattern in the configuration is invalid.
    #[error("Invalid provider pattern: {reason}")]
    InvalidPattern {
        reason: String,
    },

    /// The configuration file is not valid TOML or has unexpected keys.
    #[error("Invalid configuration file {file}: {reason}")]
    ConfigParseError {
        file: String,
        reason: String,
    },

    /// The package cache could not be written or contained a bad package.
    #[error("Provider cache error: {reason}")]
    CacheError {
        reason: String,
    },

    /// A provider source failed to answer.
    #[error("Provider source error: {reason}")]
    SourceError {
        reason: String,
    },

    #[error("Permission denied: {operation}")]
    PermissionDenied {
        operation: String,
        path: String,
    },

    #[error("File system error: {operation}")]
    FileSystemError {
        operation: String,
        path: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{message}")]
    Other {
        message: String,
    },
}

/// A [`ProvmanError`] with optional suggestion and details for the user.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub error: ProvmanError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: ProvmanError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }

    /// A context holding only a suggestion.
    pub fn suggestion(suggestion: impl Into<String>) -> Self {
        Self {
            error: ProvmanError::Other {
                message: String::new(),
            },
            suggestion: Some(suggestion.into()),
            details: None,
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Attach a suggestion and details while converting into [`anyhow::Error`].
pub trait IntoAnyhowWithContext {
    fn into_anyhow_with_context(self, suggestion: &str, details: &str) -> anyhow::Error;
}

impl IntoAnyhowWithContext for ProvmanError {
    fn into_anyhow_with_context(self, suggestion: &str, details: &str) -> anyhow::Error {
        anyhow::Error::new(ErrorContext::new(self).with_suggestion(suggestion).with_details(details))
    }
}

/// Turn any error into an [`ErrorContext`] suitable for [`ErrorContext::display`].
///
/// Errors from this crate's components are recognized anywhere in the chain
/// of context layers; the outermost recognized one wins. Unknown errors fall
/// back to [`ProvmanError::Other`] with the full cause chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(ctx) = cause.downcast_ref::<ErrorContext>() {
            return ctx.clone();
        }
        if let Some(e) = cause.downcast_ref::<ProvmanError>() {
            return create_error_context(e.clone());
        }
        if let Some(e) = cause.downcast_ref::<InstallerError>() {
            return from_installer_error(e);
        }
        if let Some(e) = cause.downcast_ref::<LockFileError>() {
            return from_lock_file_error(e);
        }
        if let Some(e) = cause.downcast_ref::<CacheError>() {
            return from_cache_error(e);
        }
        if let Some(e) = cause.downcast_ref::<SourceError>() {
            return from_source_error(e);
        }
        if let Some(e) = cause.downcast_ref::<RequirementError>() {
            let (given, reason) = match e {
                RequirementError::Address {
                    given,
                    source,
                } => (given.clone(), source.to_string()),
                RequirementError::Constraints {
                    given,
                    source,
                } => (given.clone(), source.to_string()),
            };
            return create_error_context(ProvmanError::InvalidRequirement {
                given,
                reason,
            });
        }
        if let Some(e) = cause.downcast_ref::<AddrError>() {
            return create_error_context(ProvmanError::InvalidProviderAddress {
                reason: e.to_string(),
            });
        }
        if let Some(e) = cause.downcast_ref::<PatternError>() {
            return create_error_context(ProvmanError::InvalidPattern {
                reason: e.to_string(),
            });
        }
        if let Some(e) = cause.downcast_ref::<toml::de::Error>() {
            return create_error_context(ProvmanError::ConfigParseError {
                file: context_path(&error).unwrap_or_else(|| "configuration".to_string()),
                reason: e.message().to_string(),
            });
        }
        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            let path = context_path(&error).unwrap_or_default();
            match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    return create_error_context(ProvmanError::PermissionDenied {
                        operation: error.to_string(),
                        path,
                    });
                }
                std::io::ErrorKind::NotFound => {
                    return create_error_context(ProvmanError::FileSystemError {
                        operation: error.to_string(),
                        path,
                    });
                }
                _ => {}
            }
        }
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(ProvmanError::Other {
        message,
    })
}

// Context layers added with `.with_context(|| format!("... {}", path))` end
// in the path; pick it out for the error's `path` field.
fn context_path(error: &anyhow::Error) -> Option<String> {
    let outer = error.to_string();
    let last = outer.rsplit(' ').next()?;
    (last.contains('/') || last.contains('\\')).then(|| last.trim_end_matches(':').to_string())
}

fn from_installer_error(error: &InstallerError) -> ErrorContext {
    match error {
        InstallerError::HashMismatch {
            provider,
            version,
            platform,
            expected,
            actual,
        } => create_error_context(ProvmanError::ChecksumMismatch {
            provider: provider.to_string(),
            version: version.to_string(),
            platform: platform.to_string(),
            expected: expected.iter().map(ToString::to_string).collect(),
            actual: actual.to_string(),
        }),
        InstallerError::LockFile(e) => from_lock_file_error(e),
        InstallerError::ProvidersFailed {
            diagnostics,
        } => create_error_context(ProvmanError::ProvidersFailed {
            count: diagnostics.errors().count(),
            problems: diagnostics.to_string(),
        }),
        InstallerError::ProvidersUnavailableOffline {
            providers,
            dirs,
            ..
        } => create_error_context(ProvmanError::ProvidersUnavailableOffline {
            providers: providers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            dirs: dirs.iter().map(|d| d.display().to_string()).collect(),
        }),
        InstallerError::Cancelled => create_error_context(ProvmanError::Cancelled),
    }
}

fn from_lock_file_error(error: &LockFileError) -> ErrorContext {
    match error {
        LockFileError::MalformedLockFile {
            path,
            diagnostics,
        } => create_error_context(ProvmanError::LockFileInvalid {
            file: path.display().to_string(),
            problems: diagnostics.to_string(),
        }),
        LockFileError::Io {
            path,
            message,
        } => create_error_context(ProvmanError::LockFileIo {
            file: path.display().to_string(),
            reason: message.clone(),
        }),
        LockFileError::NotLockable {
            ..
        } => create_error_context(ProvmanError::Other {
            message: error.to_string(),
        }),
    }
}

fn from_cache_error(error: &CacheError) -> ErrorContext {
    match error {
        CacheError::HashMismatch {
            provider,
            version,
            platform,
            expected,
            actual,
        } => create_error_context(ProvmanError::ChecksumMismatch {
            provider: provider.to_string(),
            version: version.to_string(),
            platform: platform.to_string(),
            expected: expected.iter().map(ToString::to_string).collect(),
            actual: actual.to_string(),
        }),
        CacheError::Cancelled => create_error_context(ProvmanError::Cancelled),
        _ => create_error_context(ProvmanError::CacheError {
            reason: error.to_string(),
        }),
    }
}

fn from_source_error(error: &SourceError) -> ErrorContext {
    match error {
        SourceError::Cancelled => create_error_context(ProvmanError::Cancelled),
        _ => create_error_context(ProvmanError::SourceError {
            reason: error.to_string(),
        }),
    }
}

/// Attach the suggestion and details that fit each [`ProvmanError`].
fn create_error_context(error: ProvmanError) -> ErrorContext {
    match &error {
        ProvmanError::ChecksumMismatch {
            expected,
            actual,
            ..
        } => {
            let details = format!(
                "Expected one of:\n  {}\nGot:\n  {actual}",
                if expected.is_empty() { "(none)".to_string() } else { expected.join("\n  ") }
            );
            ErrorContext::new(error)
                .with_suggestion(
                    "The package may have been altered. If the provider's distribution legitimately \
                     changed, remove its entry from the lock file and run 'provman install' again",
                )
                .with_details(details)
        }

        ProvmanError::LockFileInvalid {
            problems,
            ..
        } => {
            let problems = problems.clone();
            ErrorContext::new(error)
                .with_suggestion(
                    "Fix the problems above, or delete the lock file and run 'provman install' to regenerate it",
                )
                .with_details(problems)
        }

        ProvmanError::LockFileIo {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check that the lock file's directory exists and is writable"),

        ProvmanError::ProvidersFailed {
            problems,
            ..
        } => {
            let problems = problems.clone();
            ErrorContext::new(error)
                .with_suggestion(
                    "Check the version constraints and the provider_installation methods in your configuration",
                )
                .with_details(problems)
        }

        ProvmanError::ProvidersUnavailableOffline {
            dirs,
            ..
        } => {
            let details = format!("Searched:\n  {}", dirs.join("\n  "));
            ErrorContext::new(error)
                .with_suggestion(
                    "Place the missing providers in one of the plugin directories, or run without --plugin-dir",
                )
                .with_details(details)
        }

        ProvmanError::InvalidRequirement {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Use the form ADDR or ADDR=CONSTRAINTS, e.g. 'hashicorp/null=>= 2.0.0, < 3.0.0'",
        ),

        ProvmanError::InvalidProviderAddress {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Provider addresses are written as [hostname/][namespace/]type"),

        ProvmanError::InvalidPattern {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Patterns are written as hostname/namespace/type or namespace/type, with * as a wildcard segment",
        ),

        ProvmanError::ConfigParseError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax and the option names in the configuration file"),

        ProvmanError::CacheError {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Check free disk space and permissions of the cache directory, or set PROVMAN_CACHE_DIR",
        ),

        ProvmanError::SourceError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and the configured mirrors"),

        ProvmanError::PermissionDenied {
            path,
            ..
        } => {
            let details = if path.is_empty() {
                "The current user cannot access a required file or directory".to_string()
            } else {
                format!("Cannot access {path}")
            };
            ErrorContext::new(error)
                .with_suggestion("Check file permissions or run from a directory you own")
                .with_details(details)
        }

        ProvmanError::FileSystemError {
            ..
        } => ErrorContext::new(error).with_suggestion("Check that the path exists"),

        ProvmanError::Cancelled | ProvmanError::Other {
            ..
        } => ErrorContext::new(error),
    }
}
