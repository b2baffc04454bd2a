//! Response redaction for immunization resources.
//!
//! Each read operation strips its own subset of fields from the opaque
//! payload; on top of that, the restricted overlay applies when the
//! patient's demographics record carries a restricted flag, or when the
//! flag cannot be determined.

use serde_json::{json, Map, Value};

/// System URL for NHS number identifiers on contained patient resources.
pub const NHS_NUMBER_SYSTEM: &str = "https://fhir.nhs.uk/Id/nhs-number";
/// System URL organization identifiers are rewritten to under the
/// restricted overlay.
pub const ODS_ORGANIZATION_SYSTEM: &str = "https://fhir.nhs.uk/Id/ods-organization-code";

/// Replacement organization code under the restricted overlay.
const OBFUSCATED_ORGANIZATION_CODE: &str = "N2N9I";
/// Replacement postal code under the restricted overlay.
const OBFUSCATED_POSTAL_CODE: &str = "ZZ99 3CZ";

/// The contained Patient resource, if present.
pub fn contained_patient(resource: &Value) -> Option<&Value> {
    resource
        .get("contained")?
        .as_array()?
        .iter()
        .find(|r| r.get("resourceType").and_then(Value::as_str) == Some("Patient"))
}

/// The patient identifier value carried by the contained Patient resource.
pub fn patient_identifier_value(resource: &Value) -> Option<String> {
    contained_patient(resource)?
        .get("identifier")?
        .as_array()?
        .first()?
        .get("value")?
        .as_str()
        .map(str::to_string)
}

/// Redaction profile for direct-by-id reads.
pub fn read_profile(resource: Value) -> Value {
    remove_contained_practitioner_reference(resource)
}

/// Redaction profile for patient search responses.
///
/// On top of the read profile, the contained patient is replaced by an
/// intra-bundle reference, the identifier use is defaulted, and the
/// contained resources are dropped.
pub fn search_profile(resource: Value, patient_full_url: &str) -> Value {
    let mut resource = remove_contained_practitioner_reference(resource);

    let reference = patient_reference(&resource, patient_full_url);
    if let Value::Object(map) = &mut resource {
        if let Some(reference) = reference {
            map.insert("patient".to_string(), reference);
        }
        map.remove("contained");
    }

    default_identifier_use(resource)
}

/// The stricter profile applied when the patient is flagged restricted.
///
/// Removes the venue, obfuscates performing-organization identifiers, and
/// reduces contained patient addresses to a placeholder postcode.
pub fn restricted_overlay(mut resource: Value) -> Value {
    if let Value::Object(map) = &mut resource {
        map.remove("location");
    }
    obfuscate_performer_organizations(obfuscate_patient_addresses(resource))
}

fn contained_practitioner_id(resource: &Value) -> Option<String> {
    resource
        .get("contained")?
        .as_array()?
        .iter()
        .find(|r| r.get("resourceType").and_then(Value::as_str) == Some("Practitioner"))?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

/// Removes performer entries referencing the contained practitioner.
fn remove_contained_practitioner_reference(mut resource: Value) -> Value {
    let Some(practitioner_id) = contained_practitioner_id(&resource) else {
        return resource;
    };
    let local_reference = format!("#{practitioner_id}");

    if let Some(performers) = resource.get_mut("performer").and_then(Value::as_array_mut) {
        performers.retain(|performer| {
            performer
                .get("actor")
                .and_then(|actor| actor.get("reference"))
                .and_then(Value::as_str)
                != Some(local_reference.as_str())
        });
    }

    resource
}

/// Builds the reference to the bundled patient resource, carrying the NHS
/// number identifier when the contained patient has one.
fn patient_reference(resource: &Value, patient_full_url: &str) -> Option<Value> {
    let patient = contained_patient(resource)?;
    let identifier = patient
        .get("identifier")?
        .as_array()?
        .iter()
        .find(|identifier| {
            identifier.get("system").and_then(Value::as_str) == Some(NHS_NUMBER_SYSTEM)
        })?;

    Some(json!({
        "reference": patient_full_url,
        "type": "Patient",
        "identifier": {
            "system": identifier.get("system").cloned().unwrap_or(Value::Null),
            "value": identifier.get("value").cloned().unwrap_or(Value::Null),
        },
    }))
}

/// Defaults `identifier[0].use` to `"official"` when unset; a supplied use
/// is left as it is.
fn default_identifier_use(mut resource: Value) -> Value {
    if let Some(Value::Object(identifier)) = resource
        .get_mut("identifier")
        .and_then(Value::as_array_mut)
        .and_then(|identifiers| identifiers.first_mut())
    {
        identifier
            .entry("use")
            .or_insert_with(|| Value::String("official".to_string()));
    }
    resource
}

/// Reduces contained patient addresses to their postal code, replaced with
/// the placeholder.
fn obfuscate_patient_addresses(mut resource: Value) -> Value {
    let Some(contained) = resource.get_mut("contained").and_then(Value::as_array_mut) else {
        return resource;
    };

    for item in contained
        .iter_mut()
        .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some("Patient"))
    {
        if let Some(addresses) = item.get_mut("address").and_then(Value::as_array_mut) {
            for address in addresses {
                *address = if address.get("postalCode").is_some() {
                    json!({ "postalCode": OBFUSCATED_POSTAL_CODE })
                } else {
                    Value::Object(Map::new())
                };
            }
        }
    }

    resource
}

/// Rewrites performing-organization identifiers to the placeholder ODS
/// code and strips every other actor field.
fn obfuscate_performer_organizations(mut resource: Value) -> Value {
    let Some(performers) = resource.get_mut("performer").and_then(Value::as_array_mut) else {
        return resource;
    };

    for performer in performers {
        let Some(actor) = performer.get_mut("actor") else {
            continue;
        };
        if actor.get("type").and_then(Value::as_str) != Some("Organization") {
            continue;
        }
        let Value::Object(actor_map) = actor else {
            continue;
        };

        if let Some(Value::Object(identifier)) = actor_map.get_mut("identifier") {
            if identifier.contains_key("value") {
                identifier.insert(
                    "value".to_string(),
                    Value::String(OBFUSCATED_ORGANIZATION_CODE.to_string()),
                );
                identifier.insert(
                    "system".to_string(),
                    Value::String(ODS_ORGANIZATION_SYSTEM.to_string()),
                );
            }
            if identifier.contains_key("system") {
                identifier.insert(
                    "system".to_string(),
                    Value::String(ODS_ORGANIZATION_SYSTEM.to_string()),
                );
            }
            identifier.retain(|key, _| key == "system" || key == "value");
        }

        actor_map.retain(|key, _| key == "identifier" || key == "type");
    }

    resource
}
