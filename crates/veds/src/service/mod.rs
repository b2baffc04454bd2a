//! Service layer.
//!
//! Orchestrates authorization, content validation, the delete/reinstate
//! state machine, and response redaction on top of the repository.

mod error;
mod immunization;
pub mod redaction;

pub use error::ServiceError;
pub use immunization::{IdentifierView, ImmunizationService, RecordView, SearchOutcome};
