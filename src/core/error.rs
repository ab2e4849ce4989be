//! Error handling for the updater
//!
//! This module provides the error taxonomy of the update engine and user-friendly
//! error reporting for the command line driver. The error system follows two rules:
//! 1. **Strongly-typed errors** returned by every engine operation
//! 2. **User-friendly messages** with actionable suggestions at the CLI boundary
//!
//! # Architecture
//!
//! - [`UpdaterError`] - Enumerated error types for all engine failure cases
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Error Categories
//!
//! - **Network**: [`UpdaterError::Network`], [`UpdaterError::Parse`]
//! - **Release selection**: [`UpdaterError::NoReleases`], [`UpdaterError::VersionParse`]
//! - **Detection**: [`UpdaterError::RegistryAccess`], [`UpdaterError::FileNotFound`],
//!   [`UpdaterError::MissingDetectionData`], [`UpdaterError::InvalidDetectionMethod`]
//! - **Installation**: [`UpdaterError::Launch`], [`UpdaterError::ChecksumMismatch`]
//! - **Security**: [`UpdaterError::SignatureMismatch`]
//! - **Registration**: [`UpdaterError::Registration`]
//!
//! Engine operations never panic past their boundary: detection, fetch, download and
//! setup all hand back a discriminated result and the caller decides whether to
//! retry, show a dialog or fall back to an emergency URL.
//!
//! # Examples
//!
//! ```rust,no_run
//! use setup_updater::core::{UpdaterError, user_friendly_error};
//!
//! fn fetch() -> Result<(), UpdaterError> {
//!     Err(UpdaterError::NoReleases)
//! }
//!
//! if let Err(e) = fetch() {
//!     let ctx = user_friendly_error(anyhow::Error::from(e));
//!     ctx.display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update engine operations
///
/// Each variant describes one failure mode of the update pipeline and carries the
/// data a caller needs to decide how to react (for example the HTTP status of a
/// failed request or the OS error code of a failed process launch).
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// The remote API could not be reached or answered with a non-success status
    ///
    /// `status` is `None` when no HTTP response was received at all (DNS failure,
    /// timeout, refused connection).
    #[error("Network request failed{}: {reason}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Network {
        /// HTTP status code, if a response was received
        status: Option<u16>,
        /// Transport or server supplied reason
        reason: String,
    },

    /// The server response body could not be parsed
    #[error("Failed to parse update information: {reason}")]
    Parse {
        /// Parser error message
        reason: String,
    },

    /// The release list is empty after filtering
    #[error("No releases are available for this product")]
    NoReleases,

    /// A version string could not be coerced into a semantic version
    #[error("Failed to parse '{input}' as a semantic version")]
    VersionParse {
        /// The offending input
        input: String,
    },

    /// A registry key or value required for detection could not be read
    #[error("Registry access failed for '{key}': {reason}")]
    RegistryAccess {
        /// Full key path including the value name
        key: String,
        /// Failure description
        reason: String,
    },

    /// A file required for detection does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// The rendered file path
        path: String,
    },

    /// The selected release lacks data required by the detection method
    #[error("Release is missing required detection data '{field}'")]
    MissingDetectionData {
        /// Name of the missing release field
        field: String,
    },

    /// The detection method is absent, malformed or produced unusable output
    #[error("Invalid detection method: {reason}")]
    InvalidDetectionMethod {
        /// Failure description
        reason: String,
    },

    /// A process could not be launched
    #[error("Failed to launch '{path}' (OS error {win32_error})")]
    Launch {
        /// Path of the program that failed to launch
        path: String,
        /// OS error code reported by the launch primitive
        win32_error: u32,
    },

    /// The parent process is not an identical copy of the running binary
    #[error("Parent process '{parent}' does not match the running binary '{current}'")]
    SignatureMismatch {
        /// Parent executable path (or a placeholder if unknown)
        parent: String,
        /// Current executable path
        current: String,
    },

    /// Autostart or scheduled task registration failed
    #[error("Failed to {operation}: {reason}")]
    Registration {
        /// Operation being performed, for example "create scheduled task"
        operation: String,
        /// Failure description
        reason: String,
    },

    /// A downloaded file failed checksum verification
    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Path of the verified file
        path: String,
        /// Expected hex digest
        expected: String,
        /// Computed hex digest
        actual: String,
    },

    /// A template failed to render
    #[error("Template rendering failed: {reason}")]
    Template {
        /// Renderer error chain
        reason: String,
    },

    /// Local configuration could not be used
    #[error("Configuration error: {message}")]
    Config {
        /// Failure description
        message: String,
    },

    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with a custom message
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl Clone for UpdaterError {
    fn clone(&self) -> Self {
        match self {
            Self::Network {
                status,
                reason,
            } => Self::Network {
                status: *status,
                reason: reason.clone(),
            },
            Self::Parse {
                reason,
            } => Self::Parse {
                reason: reason.clone(),
            },
            Self::NoReleases => Self::NoReleases,
            Self::VersionParse {
                input,
            } => Self::VersionParse {
                input: input.clone(),
            },
            Self::RegistryAccess {
                key,
                reason,
            } => Self::RegistryAccess {
                key: key.clone(),
                reason: reason.clone(),
            },
            Self::FileNotFound {
                path,
            } => Self::FileNotFound {
                path: path.clone(),
            },
            Self::MissingDetectionData {
                field,
            } => Self::MissingDetectionData {
                field: field.clone(),
            },
            Self::InvalidDetectionMethod {
                reason,
            } => Self::InvalidDetectionMethod {
                reason: reason.clone(),
            },
            Self::Launch {
                path,
                win32_error,
            } => Self::Launch {
                path: path.clone(),
                win32_error: *win32_error,
            },
            Self::SignatureMismatch {
                parent,
                current,
            } => Self::SignatureMismatch {
                parent: parent.clone(),
                current: current.clone(),
            },
            Self::Registration {
                operation,
                reason,
            } => Self::Registration {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::ChecksumMismatch {
                path,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                path: path.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::Template {
                reason,
            } => Self::Template {
                reason: reason.clone(),
            },
            Self::Config {
                message,
            } => Self::Config {
                message: message.clone(),
            },
            // io::Error is not Clone, keep kind and message
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

impl From<reqwest::Error> for UpdaterError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network {
            status: error.status().map(|s| s.as_u16()),
            reason: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for UpdaterError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse {
            reason: error.to_string(),
        }
    }
}

impl From<tera::Error> for UpdaterError {
    fn from(error: tera::Error) -> Self {
        // Tera nests the useful message in the source chain
        let mut reason = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Template {
            reason,
        }
    }
}

impl UpdaterError {
    /// OS error code carried by launch failures, `0` for every other variant.
    #[must_use]
    pub const fn win32_error(&self) -> u32 {
        match self {
            Self::Launch {
                win32_error,
                ..
            } => *win32_error,
            _ => 0,
        }
    }

    /// Whether the error must be surfaced to the user even in silent mode.
    #[must_use]
    pub const fn is_security_relevant(&self) -> bool {
        matches!(self, Self::SignatureMismatch { .. })
    }

    /// Build a launch error from an [`std::io::Error`] returned by a spawn call.
    pub fn launch(path: impl Into<String>, error: &std::io::Error) -> Self {
        Self::Launch {
            path: path.into(),
            win32_error: error.raw_os_error().map_or(0, |code| code as u32),
        }
    }
}

/// Error wrapper that pairs an [`UpdaterError`] with user-facing guidance
///
/// Suggestions are shown in green, details in yellow, both below the red error
/// line. The CLI driver converts every failure into an `ErrorContext` before
/// printing it.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdaterError,
    /// Optional actionable suggestion
    pub suggestion: Option<String>,
    /// Optional explanation of the failure
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: UpdaterError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
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

/// Convert any error into a user-friendly [`ErrorContext`]
///
/// Known [`UpdaterError`] variants receive tailored suggestions. I/O errors are
/// mapped by kind. Everything else is reported with its full cause chain.
///
/// # Arguments
///
/// * `error` - The error to convert
///
/// # Returns
///
/// An [`ErrorContext`] ready for [`ErrorContext::display`].
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(updater_error) = error.downcast_ref::<UpdaterError>() {
        return create_error_context(updater_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(UpdaterError::Other {
                message: io_error.to_string(),
            })
            .with_suggestion("Run the updater as Administrator or check the permissions of the installation directory")
            .with_details("The updater could not read or write a required file");
        }
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdaterError::Other {
        message,
    })
}

fn create_error_context(error: UpdaterError) -> ErrorContext {
    match &error {
        UpdaterError::Network {
            status: None,
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check your internet connection and proxy settings, then try again")
            .with_details("The update server could not be reached"),
        UpdaterError::Network {
            status: Some(404),
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Verify that the executable name matches '<Manufacturer>_<Product>_Updater' or set 'instance.serverUrlTemplate' in the local configuration file")
            .with_details("The server does not know this product"),
        UpdaterError::Network {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("The update server reported an error, try again later"),
        UpdaterError::Parse {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Contact the product vendor, the update server returned malformed data"),
        UpdaterError::NoReleases => ErrorContext::new(error)
            .with_details("The server did not offer any enabled release for this product"),
        UpdaterError::InvalidDetectionMethod {
            ..
        }
        | UpdaterError::MissingDetectionData {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the 'detectionMethod' and 'detection' settings of the shared configuration")
            .with_details("The installed version could not be determined"),
        UpdaterError::RegistryAccess {
            ..
        }
        | UpdaterError::FileNotFound {
            ..
        } => ErrorContext::new(error)
            .with_details("The product does not appear to be installed, or the detection settings point to the wrong location"),
        UpdaterError::Launch {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Make sure the downloaded setup is not blocked by antivirus software and try again"),
        UpdaterError::SignatureMismatch {
            ..
        } => ErrorContext::new(error)
            .with_details("The temporary copy refused to run because its parent process is not the genuine updater"),
        UpdaterError::ChecksumMismatch {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("The download may be corrupted, try again")
            .with_details("The downloaded file does not match the checksum published by the server"),
        UpdaterError::Registration {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run the updater with sufficient permissions to modify autostart entries and scheduled tasks"),
        UpdaterError::Template {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check template syntax: variables use {{ var }}, control flow uses {% %}"),
        _ => ErrorContext::new(error),
    }
}
