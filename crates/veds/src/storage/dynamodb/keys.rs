//! Key generation for the immunization record table.
//!
//! Pure functions for the primary key and the two secondary indexes. All
//! functions are sync and have no side effects.

use veds_core::record::VaccineType;

// ============================================================================
// Prefixes, index names, and sentinels
// ============================================================================

pub const IMMUNIZATION_PREFIX: &str = "Immunization#";
pub const PATIENT_PREFIX: &str = "Patient#";

/// Placeholder patient segment for records without a patient identifier.
pub const UNKNOWN_PATIENT: &str = "TBC";

/// Name of the identifier secondary index.
pub const IDENTIFIER_GSI: &str = "IdentifierGSI";
/// Name of the patient secondary index.
pub const PATIENT_GSI: &str = "PatientGSI";

/// Marker stored in `DeletedAt` for a record that was deleted and later
/// reinstated. Kept distinct from "never deleted" for audit and CDC
/// consumers.
pub const REINSTATED_MARKER: &str = "reinstated";

// ============================================================================
// Primary key
// ============================================================================

/// Generate the primary key for a record.
///
/// Pattern: `Immunization#<logicalId>`
pub fn immunization_pk(id: &str) -> String {
    format!("{IMMUNIZATION_PREFIX}{id}")
}

/// Extract the logical id from a primary key.
pub fn logical_id_from_pk(pk: &str) -> Option<&str> {
    pk.strip_prefix(IMMUNIZATION_PREFIX)
}

// ============================================================================
// Patient index keys
// ============================================================================

/// Generate the patient index partition key.
///
/// Pattern: `Patient#<identifierValue>`; records without a patient
/// identifier share the `Patient#TBC` partition.
pub fn patient_pk(identifier_value: Option<&str>) -> String {
    format!(
        "{PATIENT_PREFIX}{}",
        identifier_value.unwrap_or(UNKNOWN_PATIENT)
    )
}

/// Generate the patient index sort key.
///
/// Pattern: `<vaccineType>#<logicalId>`
///
/// The vaccine type is encoded inline so that type-scoped authorization
/// and type-filtered search need no extra index.
pub fn patient_sk(vaccine_type: &VaccineType, id: &str) -> String {
    format!("{}#{}", vaccine_type.as_str(), id)
}

/// Extract the vaccine type segment from a patient sort key.
pub fn vaccine_type_from_sk(sk: &str) -> Option<VaccineType> {
    sk.split_once('#')
        .map(|(vaccine_type, _)| VaccineType::new(vaccine_type))
}
