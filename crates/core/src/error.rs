//! Error types for shmtree
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Reported vs fatal
//!
//! Errors fall into two classes:
//!
//! - **Reported**: expected outcomes of a well-formed call (`KeyExists`,
//!   `KeyNotFound`, `FieldNotFound`, `TypeMismatch`, `OutOfMemory`). The host
//!   boundary turns them into a `(false|nil, message)` pair.
//! - **Fatal**: contract violations or broken state (`BadArgument`,
//!   `BadValueType`, `Corruption`, ...). They abort the call.
//!
//! In both cases the zone lock has been released before the error reaches the
//! caller.

use std::io;
use thiserror::Error;

/// Result type alias for shmtree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for shmtree
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong arity or argument kind at the host boundary
    #[error("bad argument #{position} to '{function}' ({message})")]
    BadArgument {
        /// 1-based argument position, 0 when the whole call is malformed
        position: usize,
        /// Name of the called function
        function: String,
        /// What was expected
        message: String,
    },

    /// Insert into an occupied key
    #[error("the node exists")]
    KeyExists,

    /// No entry matched the key
    #[error("no exists")]
    KeyNotFound,

    /// The entry exists, its table has no such field
    #[error("no exists this field")]
    FieldNotFound,

    /// Field access on an entry whose value is not a table
    #[error("the value type isn't a table")]
    TypeMismatch,

    /// The zone's arena cannot satisfy an allocation
    #[error("no memory (requested {requested} bytes)")]
    OutOfMemory {
        /// Bytes requested from the arena
        requested: usize,
    },

    /// A value outside the boolean/number/string/table set
    #[error("bad value type: {0}")]
    BadValueType(String),

    /// A table nested deeper than the codec accepts
    #[error("table nesting exceeds {limit} levels")]
    NestingTooDeep {
        /// Maximum accepted depth
        limit: usize,
    },

    /// The calling thread already holds this zone's lock
    #[error("zone '{zone}' is already locked by this thread (comparator re-entered the zone?)")]
    Reentrant {
        /// Zone name
        zone: String,
    },

    /// Shared segment contents are inconsistent
    #[error("data corruption: {0}")]
    Corruption(String),

    /// I/O error while mapping a segment
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a `BadArgument` error
    pub fn bad_argument(
        position: usize,
        function: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::BadArgument {
            position,
            function: function.into(),
            message: message.into(),
        }
    }

    /// Build a `Corruption` error
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::Corruption(message.into())
    }

    /// Whether this error is an expected outcome reported back to the caller
    /// rather than a contract violation that aborts the call.
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            Error::KeyExists
                | Error::KeyNotFound
                | Error::FieldNotFound
                | Error::TypeMismatch
                | Error::OutOfMemory { .. }
        )
    }

    /// The message handed to the host for reported errors.
    ///
    /// Returns `None` for fatal errors.
    pub fn reply_message(&self) -> Option<&'static str> {
        match self {
            Error::KeyExists => Some("the node exists"),
            Error::KeyNotFound => Some("no exists"),
            Error::FieldNotFound => Some("no exists this field"),
            Error::TypeMismatch => Some("the value type isn't a table"),
            Error::OutOfMemory { .. } => Some("no memory"),
            _ => None,
        }
    }
}
