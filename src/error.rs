// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Error type for the whole engine.
//!
//! One enum, one variant per failure class. Every variant carries the
//! offending values so the message can say exactly what went wrong ("root
//! offset 42 is outside [80, 2048)") instead of making you re-run under a
//! debugger. Format validation errors keep the word "truncated" in the
//! reason when the input ended early, so callers can tell corruption from
//! a short read.

use std::fmt;
use std::io;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Error type for arena, build, load, and query failures.
#[derive(Debug)]
pub enum TreeError {
    /// A caller-supplied value failed boundary validation.
    InvalidArgument { what: String },
    /// An arena read or write fell outside the logical size.
    OutOfRange { offset: u64, len: u64, size: u64 },
    /// Magic, version, header fields, or jump ranges failed validation.
    InvalidFormat { reason: String },
    /// Growth beyond a hard ceiling (heap arena 2 GiB, compact address space).
    CapacityExceeded { requested: u64, limit: u64 },
    /// Operation on a poisoned or released arena.
    Disposed,
    /// Logical import disagreed with the rebuilt tree.
    StructuralMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },
    /// Underlying file or mapping syscall failed.
    Io(io::Error),
}

impl TreeError {
    pub(crate) fn invalid_argument(what: impl Into<String>) -> Self {
        TreeError::InvalidArgument { what: what.into() }
    }

    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        TreeError::InvalidFormat {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::InvalidArgument { what } => {
                write!(f, "invalid argument: {}", what)
            }
            TreeError::OutOfRange { offset, len, size } => {
                write!(
                    f,
                    "access of {} bytes at offset {} is outside [0, {})",
                    len, offset, size
                )
            }
            TreeError::InvalidFormat { reason } => {
                write!(f, "invalid storage format: {}", reason)
            }
            TreeError::CapacityExceeded { requested, limit } => {
                write!(
                    f,
                    "capacity exceeded: requested {} bytes, limit is {}",
                    requested, limit
                )
            }
            TreeError::Disposed => write!(f, "operation on a disposed arena"),
            TreeError::StructuralMismatch {
                what,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "structural hash mismatch: {} expected {}, got {}",
                    what, expected, actual
                )
            }
            TreeError::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TreeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TreeError {
    fn from(err: io::Error) -> Self {
        TreeError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_names_the_span() {
        let err = TreeError::OutOfRange {
            offset: 100,
            len: 8,
            size: 64,
        };
        assert_eq!(
            err.to_string(),
            "access of 8 bytes at offset 100 is outside [0, 64)"
        );
    }

    #[test]
    fn invalid_format_keeps_reason() {
        let err = TreeError::invalid_format("truncated logical export at hash bytes");
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn io_errors_convert() {
        let err: TreeError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, TreeError::Io(_)));
    }
}
