//! Error types for herakles-smem.
//!
//! Configuration errors abort an invocation before any scan begins. Read errors
//! never leave the scanner: a process that vanished or became unreadable is
//! dropped from the result set.

use std::io;

/// Invalid user input detected before scanning.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {filter} filter expression '{pattern}': {source}")]
    InvalidFilter {
        filter: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown column(s) for {view} view: {names} (known: {known})")]
    UnknownColumn {
        view: &'static str,
        names: String,
        known: String,
    },

    #[error("Unknown sort column '{name}' for {view} view (known: {known})")]
    UnknownSortColumn {
        view: &'static str,
        name: String,
        known: String,
    },

    #[error("Memory size '{0}' should be written with units, for example 1024M")]
    InvalidMemorySize(String),

    #[error("Invalid option: {0}")]
    Invalid(String),
}

/// Failure to read one process.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The process exited or its files became inaccessible between listing and reading.
    #[error("Process {pid} vanished or is inaccessible")]
    Vanished { pid: u32 },

    /// The process has no memory accounting (kernel thread or zombie).
    #[error("Process {pid} has no memory accounting")]
    NoAccounting { pid: u32 },

    #[error("I/O error reading process {pid}: {source}")]
    Io {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

impl ReadError {
    /// Classifies an I/O error from a per-process file.
    ///
    /// NotFound, PermissionDenied and ESRCH all mean the process went away or
    /// cannot be observed; anything else is kept as a plain I/O error.
    pub fn from_io(pid: u32, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ReadError::Vanished { pid },
            _ if err.raw_os_error() == Some(libc::ESRCH) => ReadError::Vanished { pid },
            _ => ReadError::Io { pid, source: err },
        }
    }
}
