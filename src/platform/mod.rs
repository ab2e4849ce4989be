//! Operating system capabilities used by the engine.
//!
//! The engine never talks to the registry, version resources or process creation
//! primitives directly. It goes through the traits in this module, collected in a
//! [`Platform`] bundle, so that detection and setup logic can run against fakes in
//! tests and against portable fallbacks on non-Windows hosts.
//!
//! - [`RegistryReader`] - read a named string value from a hive/key
//! - [`VersionResourceReader`] - read the fixed file or product version of a binary
//! - [`ProcessLauncher`] - start a program directly, through the shell, or elevated
//!
//! [`Platform::system`] returns the implementations for the current target.

#[cfg(not(windows))]
mod fallback;
#[cfg(windows)]
pub mod windows;

use crate::core::UpdaterError;
use crate::models::{RegistryHive, RegistryView, VersionResource};
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read access to registry string values.
pub trait RegistryReader: Send + Sync {
    /// Read `value` below `hive\key` in the given view.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::RegistryAccess`] if the key or value does not exist or is
    /// not a string.
    fn read_string(
        &self,
        hive: RegistryHive,
        view: RegistryView,
        key: &str,
        value: &str,
    ) -> Result<String, UpdaterError>;
}

/// Read access to version resources embedded in binaries.
pub trait VersionResourceReader: Send + Sync {
    /// Read the requested fixed version field of `path`.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::VersionParse`] if the file carries no version resource.
    fn read_version(&self, path: &Path, which: VersionResource) -> Result<Version, UpdaterError>;
}

/// How a program is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Create the process directly
    #[default]
    Direct,
    /// Let the shell pick the handler for the file
    Shell,
    /// Use the shell elevation verb (`runas`)
    Elevated,
}

/// Description of a program start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Program or document to start
    pub program: PathBuf,
    /// Arguments, passed through verbatim
    pub arguments: Vec<String>,
    /// Working directory, the program's directory when `None`
    pub working_dir: Option<PathBuf>,
    /// Launch primitive
    pub mode: LaunchMode,
}

impl LaunchRequest {
    /// Direct launch of `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            arguments: Vec::new(),
            working_dir: None,
            mode: LaunchMode::Direct,
        }
    }

    /// Set the arguments.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Set the launch mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Arguments joined into a single command line string.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.arguments.join(" ")
    }

    /// Working directory to use.
    #[must_use]
    pub fn effective_working_dir(&self) -> Option<PathBuf> {
        self.working_dir.clone().or_else(|| self.program.parent().map(Path::to_path_buf))
    }
}

/// Process creation.
pub trait ProcessLauncher: Send + Sync {
    /// Start a program and return immediately.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Launch`] with the OS error code if the start failed.
    fn spawn_detached(&self, request: &LaunchRequest) -> Result<(), UpdaterError>;

    /// Start a program and block until it exits.
    ///
    /// # Returns
    ///
    /// The process exit code.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Launch`] with the OS error code if the start failed.
    fn run_to_completion(&self, request: &LaunchRequest) -> Result<i32, UpdaterError>;
}

/// Bundle of capabilities handed to the engine.
#[derive(Clone)]
pub struct Platform {
    /// Registry access
    pub registry: Arc<dyn RegistryReader>,
    /// Version resource access
    pub versions: Arc<dyn VersionResourceReader>,
    /// Process creation
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

impl Platform {
    /// Capabilities of the running operating system.
    #[must_use]
    pub fn system() -> Self {
        #[cfg(windows)]
        {
            Self {
                registry: Arc::new(windows::WindowsRegistry),
                versions: Arc::new(windows::WindowsVersionResources),
                launcher: Arc::new(windows::WindowsLauncher),
            }
        }

        #[cfg(not(windows))]
        {
            Self {
                registry: Arc::new(fallback::UnsupportedRegistry),
                versions: Arc::new(fallback::UnsupportedVersionResources),
                launcher: Arc::new(fallback::PortableLauncher),
            }
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::system()
    }
}

/// Whether `path` starts with the `MZ` signature of a Windows executable.
#[must_use]
pub fn is_windows_executable(path: &Path) -> bool {
    use std::io::Read;

    let mut magic = [0_u8; 2];
    std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut magic)).is_ok() && magic == *b"MZ"
}

/// Prepare a single argument for a [`LaunchRequest`].
///
/// Windows launches pass the joined arguments through verbatim, so arguments
/// containing whitespace or quotes are quoted there. Elsewhere the argument is
/// returned unchanged.
#[must_use]
pub fn quote_argument(arg: &str) -> String {
    if cfg!(windows) && (arg.is_empty() || arg.contains([' ', '\t', '"'])) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Spawn a program directly with [`std::process::Command`].
fn spawn_command(request: &LaunchRequest) -> Result<std::process::Child, UpdaterError> {
    let mut command = std::process::Command::new(&request.program);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        // Installer command lines are taken verbatim from the server
        if !request.arguments.is_empty() {
            command.raw_arg(request.command_line());
        }
    }
    #[cfg(not(windows))]
    command.args(&request.arguments);

    if let Some(dir) = request.effective_working_dir() {
        command.current_dir(dir);
    }

    command
        .spawn()
        .map_err(|e| UpdaterError::launch(request.program.display().to_string(), &e))
}

/// Wait for a directly spawned child and map its status to an exit code.
fn wait_for_child(
    request: &LaunchRequest,
    mut child: std::process::Child,
) -> Result<i32, UpdaterError> {
    let status = child
        .wait()
        .map_err(|e| UpdaterError::launch(request.program.display().to_string(), &e))?;
    // Killed by a signal on unix, report a generic failure code
    Ok(status.code().unwrap_or(-1))
}
