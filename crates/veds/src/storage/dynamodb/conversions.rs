//! Attribute conversions between DynamoDB items and domain types.
//!
//! Pure functions for building the item written on create and parsing
//! items read back from the table or its indexes. Testable in isolation
//! without DynamoDB access.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde_json::Value;

use veds_core::record::{
    AuditOperation, BusinessIdentifier, Lifecycle, PatientSubset, RecordContent, RecordMetadata,
    StoredRecord, VaccineType,
};
use veds_core::storage::RepositoryError;

use super::keys;

pub type Item = HashMap<String, AttributeValue>;

/// Injects the server-assigned logical id into the payload.
pub fn with_logical_id(resource: &Value, id: &str) -> Value {
    let mut resource = resource.clone();
    if let Value::Object(map) = &mut resource {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    resource
}

/// Serializes the payload for the `Resource` attribute.
///
/// `serde_json` is built with `arbitrary_precision`, so clinical decimal
/// fields survive the round trip unchanged.
pub fn serialize_resource(resource: &Value) -> Result<String, RepositoryError> {
    serde_json::to_string(resource).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Builds the full item written by a create.
pub fn new_record_item(
    id: &str,
    resource: &Value,
    content: &RecordContent,
    patient: &PatientSubset,
    created_at: DateTime<Utc>,
) -> Result<Item, RepositoryError> {
    let mut item = HashMap::new();

    // Keys
    item.insert(
        "PK".to_string(),
        AttributeValue::S(keys::immunization_pk(id)),
    );
    item.insert(
        "PatientPK".to_string(),
        AttributeValue::S(keys::patient_pk(patient.identifier_value.as_deref())),
    );
    item.insert(
        "PatientSK".to_string(),
        AttributeValue::S(keys::patient_sk(&content.vaccine_type, id)),
    );
    item.insert(
        "IdentifierPK".to_string(),
        AttributeValue::S(content.identifier.storage_key()),
    );

    // Data
    item.insert(
        "Resource".to_string(),
        AttributeValue::S(serialize_resource(resource)?),
    );
    item.insert(
        "Operation".to_string(),
        AttributeValue::S(AuditOperation::Create.to_string()),
    );
    item.insert("Version".to_string(), AttributeValue::N("1".to_string()));
    item.insert("Reinstated".to_string(), AttributeValue::Bool(false));
    item.insert(
        "UpdatedAt".to_string(),
        AttributeValue::N(created_at.timestamp().to_string()),
    );

    Ok(item)
}

/// Converts an item to a stored record.
pub fn item_to_record(item: &Item) -> Result<StoredRecord, RepositoryError> {
    let pk = get_string(item, "PK")?;
    let id = keys::logical_id_from_pk(&pk)
        .ok_or_else(|| RepositoryError::MalformedItem(format!("Unexpected primary key: {pk}")))?
        .to_string();

    Ok(StoredRecord {
        id,
        resource: parse_resource(item)?,
        version: get_version(item)?,
    })
}

/// Parses the `Resource` attribute back into the opaque payload.
pub fn parse_resource(item: &Item) -> Result<Value, RepositoryError> {
    let raw = get_string(item, "Resource")?;
    serde_json::from_str(&raw).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Parses the tri-state `DeletedAt` attribute.
pub fn lifecycle_from_item(item: &Item) -> Result<Lifecycle, RepositoryError> {
    match item.get("DeletedAt") {
        None => Ok(Lifecycle::Active),
        Some(AttributeValue::S(marker)) if marker == keys::REINSTATED_MARKER => {
            Ok(Lifecycle::Reinstated)
        }
        Some(AttributeValue::N(epoch)) => epoch
            .parse::<i64>()
            .ok()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .map(Lifecycle::Deleted)
            .ok_or_else(|| {
                RepositoryError::MalformedItem(format!("Invalid DeletedAt timestamp: {epoch}"))
            }),
        Some(other) => Err(RepositoryError::MalformedItem(format!(
            "Unexpected DeletedAt value: {other:?}"
        ))),
    }
}

/// Re-derives the record's vaccine type from the `PatientSK` attribute.
pub fn vaccine_type_from_item(item: &Item) -> Result<VaccineType, RepositoryError> {
    let sk = get_string(item, "PatientSK")?;
    keys::vaccine_type_from_sk(&sk)
        .ok_or_else(|| RepositoryError::MalformedItem(format!("Unexpected PatientSK: {sk}")))
}

/// Assembles the routing metadata for an item.
///
/// The identifier comes from the indexed `IdentifierPK`, not the payload;
/// the two may legitimately diverge after historic data uplifts.
pub fn metadata_from_item(item: &Item) -> Result<RecordMetadata, RepositoryError> {
    let identifier_pk = get_string(item, "IdentifierPK")?;
    let identifier = BusinessIdentifier::parse_storage_key(&identifier_pk).ok_or_else(|| {
        RepositoryError::MalformedItem(format!("Unexpected IdentifierPK: {identifier_pk}"))
    })?;

    Ok(RecordMetadata {
        identifier,
        version: get_version(item)?,
        lifecycle: lifecycle_from_item(item)?,
        vaccine_type: vaccine_type_from_item(item)?,
    })
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get a required string attribute.
fn get_string(item: &Item, key: &str) -> Result<String, RepositoryError> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| RepositoryError::MalformedItem(format!("Missing or invalid field: {key}")))
}

/// Get the `Version` attribute as an integer.
fn get_version(item: &Item) -> Result<u64, RepositoryError> {
    item.get("Version")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            RepositoryError::MalformedItem("Missing or invalid field: Version".to_string())
        })
}
