use thiserror::Error;

use super::Operation;

/// Errors raised by the authorization gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The caller lacks the single `{type}:{operation}` capability the
    /// operation requires.
    #[error("unauthorized request for vaccine type {vaccine_type} ({operation})")]
    MissingPermission {
        vaccine_type: String,
        operation: Operation,
    },
    /// A multi-type search where none of the requested vaccine types are
    /// covered by the caller's permissions.
    #[error("unauthorized request for all requested vaccine types")]
    NoSearchableTypes,
}
