//! Core types and error handling for the updater
//!
//! The [`error`] module defines [`UpdaterError`], the discriminated failure type
//! returned by every engine operation, along with [`ErrorContext`] and
//! [`user_friendly_error`] used by the CLI driver to present failures.

pub mod error;

pub use error::{ErrorContext, UpdaterError, user_friendly_error};

/// Convenience alias for engine results.
pub type Result<T, E = UpdaterError> = std::result::Result<T, E>;
