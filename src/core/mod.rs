//! Core types shared by every provman component.
//!
//! # Modules
//!
//! ## `diagnostics`
//!
//! Accumulated, non-fatal problem reports:
//! - [`Diagnostic`] - one problem with a severity, summary, detail and
//!   optional source position
//! - [`Diagnostics`] - an ordered list of them, as returned by lock file
//!   decoding and installer runs
//!
//! ## `error`
//!
//! Application-level error handling for the command line:
//! - [`ProvmanError`] - the errors a user can see
//! - [`ErrorContext`] - an error with a suggestion and details, printed
//!   with colors
//! - [`user_friendly_error`] - convert any [`anyhow::Error`] carrying a
//!   component error into an [`ErrorContext`]
//! - [`IntoAnyhowWithContext`] - attach a suggestion while converting into
//!   [`anyhow::Error`]
//!
//! # Example
//!
//! ```rust
//! use provman_cli::core::{ErrorContext, ProvmanError};
//!
//! let ctx = ErrorContext::new(ProvmanError::Cancelled)
//!     .with_suggestion("Run 'provman install' again");
//! assert!(ctx.to_string().contains("Suggestion: Run 'provman install' again"));
//! ```

pub mod diagnostics;
pub mod error;

pub use diagnostics::{Diagnostic, Diagnostics, Severity, SourcePos};
pub use error::{ErrorContext, IntoAnyhowWithContext, ProvmanError, user_friendly_error};
