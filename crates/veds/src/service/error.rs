use thiserror::Error;

use veds_core::external::ValidationFailure;
use veds_core::storage::RepositoryError;

/// Errors surfaced by the service layer.
///
/// Repository conflict, not-found, and authorization kinds pass through
/// unchanged; the service only adds validation failures and its own
/// not-found routing on top.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Immunization resource does not exist. ID: {id}")]
    NotFound { id: String },

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
