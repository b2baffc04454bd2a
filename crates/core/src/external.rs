//! Traits for the external collaborators consumed by the service layer.
//!
//! The implementations live outside this workspace: the content validator
//! is the FHIR field-mandation rule engine and the patient directory is the
//! demographics (PDS) lookup. The service only ever depends on these
//! traits.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::record::ValidatedImmunization;

/// Consent/security flag reported by the patient directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientFlag {
    Unrestricted,
    Restricted,
}

/// Content errors reported by the validator.
///
/// Carried through verbatim; neither the service nor the repository
/// interprets them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Validation errors: {}", .errors.join("; "))]
pub struct ValidationFailure {
    pub errors: Vec<String>,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("patient directory lookup failed: {0}")]
pub struct DirectoryError(pub String);

/// Schema/content validation of a submitted immunization resource.
///
/// On success the payload is returned verbatim together with the extracted
/// index fields (vaccine type, business identifier, patient subset).
#[async_trait]
pub trait ContentValidator: Send + Sync {
    async fn validate(&self, resource: &Value) -> Result<ValidatedImmunization, ValidationFailure>;
}

/// Patient demographics lookup, used only to select a redaction profile.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn patient_flag(&self, patient_identifier: &str) -> Result<PatientFlag, DirectoryError>;
}
