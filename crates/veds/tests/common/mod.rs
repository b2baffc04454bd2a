//! Shared fixtures: stub collaborators and sample resources.

use async_trait::async_trait;
use serde_json::{json, Value};

use veds::service::redaction::{self, NHS_NUMBER_SYSTEM};
use veds_core::auth::VaccinePermissions;
use veds_core::external::{
    ContentValidator, DirectoryError, PatientDirectory, PatientFlag, ValidationFailure,
};
use veds_core::record::{
    BusinessIdentifier, PatientSubset, RecordContent, VaccineType, ValidatedImmunization,
};

pub const IDENTIFIER_SYSTEM: &str = "https://supplierABC/identifiers/vacc";
pub const NHS_NUMBER: &str = "9000000009";

/// Stand-in for the external rule engine.
///
/// Extracts the index fields the way the real validator would: the
/// identifier from `identifier[0]`, the patient from the contained Patient
/// resource, and the vaccine type from the target disease code.
pub struct StubValidator;

fn vaccine_type_from_disease_code(resource: &Value) -> Option<VaccineType> {
    let code = resource["protocolApplied"][0]["targetDisease"][0]["coding"][0]["code"].as_str()?;
    match code {
        "840539006" => Some(VaccineType::new("COVID19")),
        "6142004" => Some(VaccineType::new("FLU")),
        _ => None,
    }
}

#[async_trait]
impl ContentValidator for StubValidator {
    async fn validate(&self, resource: &Value) -> Result<ValidatedImmunization, ValidationFailure> {
        if resource.get("resourceType").and_then(Value::as_str) != Some("Immunization") {
            return Err(ValidationFailure::new("resourceType must be Immunization"));
        }

        let identifier = resource
            .get("identifier")
            .and_then(Value::as_array)
            .and_then(|identifiers| identifiers.first())
            .and_then(|identifier| {
                Some(BusinessIdentifier::new(
                    identifier.get("system")?.as_str()?,
                    identifier.get("value")?.as_str()?,
                ))
            })
            .ok_or_else(|| ValidationFailure::new("identifier[0] is a mandatory field"))?;

        let vaccine_type = vaccine_type_from_disease_code(resource).ok_or_else(|| {
            ValidationFailure::new("protocolApplied[0].targetDisease is a mandatory field")
        })?;

        let patient = PatientSubset {
            identifier_value: redaction::patient_identifier_value(resource),
        };

        Ok(ValidatedImmunization {
            content: RecordContent {
                resource: resource.clone(),
                vaccine_type,
                identifier,
            },
            patient,
        })
    }
}

/// Stand-in for the patient demographics lookup.
pub enum StubDirectory {
    Flag(PatientFlag),
    Failing,
}

#[async_trait]
impl PatientDirectory for StubDirectory {
    async fn patient_flag(&self, _patient_identifier: &str) -> Result<PatientFlag, DirectoryError> {
        match self {
            StubDirectory::Flag(flag) => Ok(*flag),
            StubDirectory::Failing => Err(DirectoryError("connection refused".to_string())),
        }
    }
}

pub fn permissions(tokens: &[&str]) -> VaccinePermissions {
    VaccinePermissions::new(tokens.iter().copied())
}

/// A COVID-19 immunization resource with a contained patient and
/// practitioner, a performing organization, and a venue.
pub fn covid_resource(identifier_value: &str) -> Value {
    immunization_resource(identifier_value, "840539006")
}

/// A flu immunization resource with the same shape.
pub fn flu_resource(identifier_value: &str) -> Value {
    immunization_resource(identifier_value, "6142004")
}

fn immunization_resource(identifier_value: &str, disease_code: &str) -> Value {
    json!({
        "resourceType": "Immunization",
        "status": "completed",
        "identifier": [{"system": IDENTIFIER_SYSTEM, "value": identifier_value}],
        "contained": [
            {
                "resourceType": "Practitioner",
                "id": "Pract1",
                "name": [{"family": "Nightingale", "given": ["Florence"]}],
            },
            {
                "resourceType": "Patient",
                "id": "Pat1",
                "identifier": [{"system": NHS_NUMBER_SYSTEM, "value": NHS_NUMBER}],
                "address": [{"postalCode": "LS1 4AP", "city": "Leeds"}],
            },
        ],
        "performer": [
            {"actor": {"reference": "#Pract1"}},
            {
                "actor": {
                    "type": "Organization",
                    "identifier": {"system": "https://example.com/orgs", "value": "B0C4P"},
                    "display": "Acme Surgery",
                },
            },
        ],
        "location": {"identifier": {"value": "X99999"}},
        "protocolApplied": [{
            "targetDisease": [{
                "coding": [{"system": "http://snomed.info/sct", "code": disease_code}],
            }],
            "doseNumberPositiveInt": 1,
        }],
        "occurrenceDateTime": "2024-02-01T10:04:15+00:00",
        "doseQuantity": {"value": 0.5},
    })
}
