//! Structured error types for investigator
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! "Target not found" and "no managed runtime" are conditions, not errors,
//! and have no variant here.

use super::types::{Pid, Tid};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to open an inspection session.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Attaching to process {pid} timed out after {timeout_ms} ms")]
    Timeout { pid: Pid, timeout_ms: u64 },

    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Access to process {pid} denied: {reason}")]
    AccessDenied { pid: Pid, reason: String },

    #[error("An inspection session for process {0} is still open")]
    SessionActive(Pid),

    #[error("Failed to attach to process {pid}: {reason}")]
    Failed { pid: Pid, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to locate or load the runtime-introspection component.
#[derive(Error, Debug)]
pub enum DacResolutionError {
    #[error("No data access component location known for runtime {version}")]
    NoLocation { version: String },

    #[error("Cannot read data access component {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid data access component {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("Runtime {0} is not supported by this inspector")]
    Unsupported(String),
}

/// Failure during a thread or heap traversal. Fatal to the current command.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Failed to unwind thread {tid}: {reason}")]
    Unwind { tid: Tid, reason: String },

    #[error("Heap enumeration failed: {0}")]
    Heap(String),

    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Any failure of an inspection command, as seen by the dispatcher.
#[derive(Error, Debug)]
pub enum InspectError {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Dac(#[from] DacResolutionError),

    #[error(transparent)]
    Walk(#[from] WalkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_error_display() {
        let err = AttachError::ProcessNotFound(Pid(1234));
        assert_eq!(err.to_string(), "Process PID:1234 not found");
    }

    #[test]
    fn test_timeout_error_mentions_budget() {
        let err = AttachError::Timeout { pid: Pid(42), timeout_ms: 5000 };
        assert!(err.to_string().contains("5000 ms"));
        assert!(err.to_string().contains("PID:42"));
    }

    #[test]
    fn test_dac_unreadable_includes_path() {
        let err = DacResolutionError::Unreadable {
            path: PathBuf::from("/opt/dotnet/libmscordaccore.so"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/opt/dotnet/libmscordaccore.so"));
    }

    #[test]
    fn test_inspect_error_is_transparent() {
        let err: InspectError = WalkError::Heap("segment list corrupted".to_string()).into();
        assert_eq!(err.to_string(), "Heap enumeration failed: segment list corrupted");
    }
}
