mod identifier;
mod types;

pub use identifier::BusinessIdentifier;
pub use types::{
    AuditOperation, Lifecycle, PatientSubset, RecordContent, RecordMetadata, StoredRecord,
    VaccineType, ValidatedImmunization,
};
