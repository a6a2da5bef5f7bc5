//! Errors produced when parsing identifier strings.

use thiserror::Error;

/// Errors that can occur when parsing a typed ID from its string form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The input has no `_` separating prefix from ULID.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The prefix does not match the expected resource type.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    WrongPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ULID portion failed to parse.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),
}
