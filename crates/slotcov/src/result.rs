//! Result and error types for Slotcov.
//!
//! Errors fall into three groups, distinguished by [`FailureAction`]:
//!
//! - broken callers (container push/pop mismatches, read-only registry) must propagate
//! - a concurrent registry commit forces the caller to redo its instrumentation pass
//! - a bad recording on disk only costs that one test's contribution to a query

use std::fmt;
use thiserror::Error;

/// Result type for Slotcov operations
pub type SlotcovResult<T> = Result<T, SlotcovError>;

/// Kind of an entity container in the instrumentation tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Source file (bottom of every nesting)
    File,
    /// Class, interface, enum or annotation
    Class,
    /// Method, inner function or lambda
    Method,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Method => "method",
        };
        f.write_str(name)
    }
}

/// What a caller is expected to do with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// The caller is broken; surface the error unchanged
    Propagate,
    /// Discard the session and instrument the unit again from the new registry version
    Restart,
    /// Drop this test's contribution and carry on with the rest of the query
    SkipTest,
}

/// Errors that can occur in Slotcov
#[derive(Debug, Error)]
pub enum SlotcovError {
    /// Another session committed between this session's start and its commit
    #[error("Concurrent instrumentation: expected registry version {expected}, found {actual}")]
    ConcurrentInstrumentation {
        /// Version captured when the session started
        expected: i64,
        /// Version the registry holds now
        actual: i64,
    },

    /// Sessions cannot be started against a read-only registry
    #[error("Registry is read-only; cannot start an instrumentation session")]
    ReadOnlyRegistry,

    /// Exit called while no container was open
    #[error("Trying to pop a {expected} but the container stack is empty")]
    ContainerStackEmpty {
        /// Kind the caller tried to exit
        expected: ContainerKind,
    },

    /// Exit called for a container kind that is not on top of the stack
    #[error("Trying to pop a {expected} but found a {found} on the container stack")]
    ContainerMismatch {
        /// Kind the caller tried to exit
        expected: ContainerKind,
        /// Kind actually on top
        found: ContainerKind,
    },

    /// A file was entered or exited while a class or method was still open
    #[error("Cannot leave {kind} scope open at a file boundary")]
    ContainerStillOpen {
        /// Kind of the container left open
        kind: ContainerKind,
    },

    /// An element was added where no suitable container is open
    #[error("No enclosing container for {operation}")]
    NoEnclosingContainer {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// A recording's counter stream is truncated or overruns its declared length
    #[error("Recording corrupt: {message}")]
    RecordingCorrupt {
        /// Error message
        message: String,
    },

    /// A recording file has an unknown header
    #[error("Invalid recording: {message}")]
    InvalidRecording {
        /// Error message
        message: String,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SlotcovError {
    /// Create a corrupt-recording error
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::RecordingCorrupt {
            message: message.into(),
        }
    }

    /// Create an invalid-recording error
    #[must_use]
    pub fn invalid_recording(message: impl Into<String>) -> Self {
        Self::InvalidRecording {
            message: message.into(),
        }
    }

    /// Create an invalid-configuration error
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Classify the error
    #[must_use]
    pub fn action(&self) -> FailureAction {
        match self {
            Self::ConcurrentInstrumentation { .. } => FailureAction::Restart,
            Self::RecordingCorrupt { .. } | Self::InvalidRecording { .. } | Self::Io(_) => {
                FailureAction::SkipTest
            }
            Self::ReadOnlyRegistry
            | Self::ContainerStackEmpty { .. }
            | Self::ContainerMismatch { .. }
            | Self::ContainerStillOpen { .. }
            | Self::NoEnclosingContainer { .. }
            | Self::InvalidConfig { .. }
            | Self::Json(_) => FailureAction::Propagate,
        }
    }

    /// True when only the current test's contribution is affected
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.action() == FailureAction::SkipTest
    }
}
