//! Error types for the container manager.
//!
//! Every failure names the operation that was attempted and carries one
//! level of cause. Presentation to the user is a single line on stderr;
//! the binary maps [`Error::LauncherExitNonzero`] to its own exit status
//! so the container command's result is propagated bit-exact.

use std::path::PathBuf;

/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing containers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Bad storage spec, bridge spec, or missing required argument.
    #[error("invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Host Prerequisite Errors
    // =========================================================================
    /// An external helper binary is missing or a kernel facility is absent.
    #[error("host prerequisite missing: {operation}: {reason}")]
    HostPrereq {
        /// What the manager was trying to do.
        operation: String,
        /// Underlying cause.
        reason: String,
    },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// A storage backend operation failed.
    #[error("storage: {operation}: {reason}")]
    Storage {
        /// What the backend was trying to do.
        operation: String,
        /// Underlying cause.
        reason: String,
    },

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// A host or container network mutation failed.
    #[error("network: {operation}: {reason}")]
    Network {
        /// What the manager was trying to do.
        operation: String,
        /// Underlying cause.
        reason: String,
    },

    // =========================================================================
    // Package Install Errors
    // =========================================================================
    /// The package installer failed to populate a base image.
    #[error("can't install packages into '{}': {reason}", dir.display())]
    PackageInstall {
        /// Target image directory.
        dir: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    // =========================================================================
    // Launcher Errors
    // =========================================================================
    /// The external container launcher could not be spawned or waited on.
    #[error("container launcher failed: {0}")]
    Launcher(String),

    /// The user command inside the container exited nonzero.
    ///
    /// The status is surfaced as the manager's own exit status.
    #[error("command exited with status {code}")]
    LauncherExitNonzero {
        /// Exit status of the user command.
        code: i32,
    },

    // =========================================================================
    // Cleanup Errors
    // =========================================================================
    /// A teardown step failed after the primary operation completed.
    #[error("cleanup of {resource} failed: {reason}")]
    Cleanup {
        /// Resource that could not be released.
        resource: String,
        /// Underlying cause.
        reason: String,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit status the binary should report for this error.
    ///
    /// The user command's status passes through unchanged; every other
    /// manager failure exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LauncherExitNonzero { code } => *code,
            _ => 1,
        }
    }
}
