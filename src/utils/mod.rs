//! Filesystem helpers and terminal progress rendering.
//!
//! # Modules
//!
//! - [`fs`] - directory creation, atomic writes, recursive copy and removal
//! - [`progress`] - `indicatif` rendering of installer events

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, copy_dir, ensure_dir, remove_dir_all};
pub use progress::InstallProgress;
