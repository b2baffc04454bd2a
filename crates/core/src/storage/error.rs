use thiserror::Error;

use crate::auth::AuthError;

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The logical id does not exist, or the record is logically deleted
    /// and the operation does not special-case deletion.
    #[error("Immunization resource does not exist. ID: {id}")]
    NotFound { id: String },

    /// The business identifier is already bound to a different record.
    #[error("The provided identifier: {identifier} is duplicated")]
    DuplicateIdentifier { identifier: String },

    /// A conditional write was rejected: the stored version did not match
    /// the version the caller last read, or the lifecycle precondition
    /// failed. The caller must re-fetch before retrying.
    #[error("Version or lifecycle conflict for record: {id}")]
    VersionConflict { id: String },

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// The store failed or returned a response that cannot be handled.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored item is missing attributes or carries attributes of the
    /// wrong type.
    #[error("Malformed item: {0}")]
    MalformedItem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
