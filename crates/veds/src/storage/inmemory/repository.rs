//! In-memory repository implementation.
//!
//! Mirrors the conditional-write semantics of the DynamoDB backend
//! (version preconditions, lifecycle sentinels, identifier deduplication)
//! so the service layer can be exercised without a store. Data is not
//! persisted and is lost when the repository is dropped.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use veds_core::auth::{self, Operation, VaccinePermissions};
use veds_core::record::{
    AuditOperation, BusinessIdentifier, Lifecycle, PatientSubset, RecordContent, RecordMetadata,
    StoredRecord, VaccineType,
};
use veds_core::storage::{ImmunizationRepository, RepositoryError, Result};

#[derive(Debug, Clone)]
struct StoredItem {
    resource: Value,
    version: u64,
    lifecycle: Lifecycle,
    vaccine_type: VaccineType,
    identifier_key: String,
    patient_identifier: Option<String>,
    reinstated: bool,
    operation: AuditOperation,
    updated_at: DateTime<Utc>,
}

/// In-memory record store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<RwLock<HashMap<String, StoredItem>>>,
}

impl InMemoryRepository {
    /// Creates a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn identifier_owner(records: &HashMap<String, StoredItem>, key: &str) -> Option<String> {
        records
            .iter()
            .find(|(_, item)| item.identifier_key == key)
            .map(|(id, _)| id.clone())
    }

    fn inject_logical_id(resource: &Value, id: &str) -> Value {
        let mut resource = resource.clone();
        if let Value::Object(map) = &mut resource {
            map.insert("id".to_string(), Value::String(id.to_string()));
        }
        resource
    }
}

#[async_trait]
impl ImmunizationRepository for InMemoryRepository {
    async fn create(
        &self,
        content: &RecordContent,
        patient: &PatientSubset,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord> {
        auth::check(Operation::Create, &content.vaccine_type, permissions)?;

        let mut records = self.records.write().await;
        let identifier_key = content.identifier.storage_key();
        if Self::identifier_owner(&records, &identifier_key).is_some() {
            return Err(RepositoryError::DuplicateIdentifier {
                identifier: identifier_key,
            });
        }

        let id = Uuid::new_v4().to_string();
        let resource = Self::inject_logical_id(&content.resource, &id);
        records.insert(
            id.clone(),
            StoredItem {
                resource: resource.clone(),
                version: 1,
                lifecycle: Lifecycle::Active,
                vaccine_type: content.vaccine_type.clone(),
                identifier_key,
                patient_identifier: patient.identifier_value.clone(),
                reinstated: false,
                operation: AuditOperation::Create,
                updated_at: Utc::now(),
            },
        );

        Ok(StoredRecord {
            id,
            resource,
            version: 1,
        })
    }

    async fn get_by_id(
        &self,
        id: &str,
        permissions: &VaccinePermissions,
    ) -> Result<Option<StoredRecord>> {
        let records = self.records.read().await;
        let Some(item) = records.get(id) else {
            return Ok(None);
        };

        if item.lifecycle.is_deleted() {
            return Ok(None);
        }

        auth::check(Operation::Read, &item.vaccine_type, permissions)?;

        Ok(Some(StoredRecord {
            id: id.to_string(),
            resource: item.resource.clone(),
            version: item.version,
        }))
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<(Value, RecordMetadata)>> {
        let records = self.records.read().await;
        let Some(item) = records.get(id) else {
            return Ok(None);
        };

        let identifier =
            BusinessIdentifier::parse_storage_key(&item.identifier_key).ok_or_else(|| {
                RepositoryError::MalformedItem(format!(
                    "Unexpected identifier key: {}",
                    item.identifier_key
                ))
            })?;

        Ok(Some((
            item.resource.clone(),
            RecordMetadata {
                identifier,
                version: item.version,
                lifecycle: item.lifecycle,
                vaccine_type: item.vaccine_type.clone(),
            },
        )))
    }

    async fn get_by_identifier(
        &self,
        identifier: &BusinessIdentifier,
        permissions: &VaccinePermissions,
    ) -> Result<Option<StoredRecord>> {
        let records = self.records.read().await;
        let key = identifier.storage_key();
        let Some((id, item)) = records.iter().find(|(_, item)| item.identifier_key == key) else {
            return Ok(None);
        };

        auth::check(Operation::Search, &item.vaccine_type, permissions)?;

        Ok(Some(StoredRecord {
            id: id.clone(),
            resource: item.resource.clone(),
            version: item.version,
        }))
    }

    async fn update(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord> {
        auth::check(Operation::Update, &content.vaccine_type, permissions)?;

        let mut records = self.records.write().await;
        let identifier_key = content.identifier.storage_key();
        if let Some(owner) = Self::identifier_owner(&records, &identifier_key) {
            if owner != id {
                return Err(RepositoryError::DuplicateIdentifier {
                    identifier: identifier_key,
                });
            }
        }

        let Some(item) = records.get_mut(id) else {
            return Err(RepositoryError::VersionConflict { id: id.to_string() });
        };
        if item.version != expected_version || item.lifecycle != Lifecycle::Active {
            return Err(RepositoryError::VersionConflict { id: id.to_string() });
        }

        let resource = Self::inject_logical_id(&content.resource, id);
        item.resource = resource.clone();
        item.version += 1;
        item.vaccine_type = content.vaccine_type.clone();
        item.identifier_key = identifier_key;
        item.patient_identifier = patient.identifier_value.clone();
        item.operation = AuditOperation::Update;
        item.updated_at = Utc::now();

        Ok(StoredRecord {
            id: id.to_string(),
            resource,
            version: item.version,
        })
    }

    async fn reinstate(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord> {
        auth::check(Operation::Update, &content.vaccine_type, permissions)?;

        let mut records = self.records.write().await;
        let identifier_key = content.identifier.storage_key();
        if let Some(owner) = Self::identifier_owner(&records, &identifier_key) {
            if owner != id {
                return Err(RepositoryError::DuplicateIdentifier {
                    identifier: identifier_key,
                });
            }
        }

        let Some(item) = records.get_mut(id) else {
            return Err(RepositoryError::VersionConflict { id: id.to_string() });
        };
        if item.version != expected_version || !item.lifecycle.has_deletion_history() {
            return Err(RepositoryError::VersionConflict { id: id.to_string() });
        }

        let resource = Self::inject_logical_id(&content.resource, id);
        item.resource = resource.clone();
        item.version += 1;
        item.lifecycle = Lifecycle::Reinstated;
        item.vaccine_type = content.vaccine_type.clone();
        item.identifier_key = identifier_key;
        item.patient_identifier = patient.identifier_value.clone();
        item.reinstated = true;
        item.operation = AuditOperation::Update;
        item.updated_at = Utc::now();

        Ok(StoredRecord {
            id: id.to_string(),
            resource,
            version: item.version,
        })
    }

    async fn update_reinstated(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord> {
        auth::check(Operation::Update, &content.vaccine_type, permissions)?;

        let mut records = self.records.write().await;
        let identifier_key = content.identifier.storage_key();
        if let Some(owner) = Self::identifier_owner(&records, &identifier_key) {
            if owner != id {
                return Err(RepositoryError::DuplicateIdentifier {
                    identifier: identifier_key,
                });
            }
        }

        let Some(item) = records.get_mut(id) else {
            return Err(RepositoryError::VersionConflict { id: id.to_string() });
        };
        if item.version != expected_version || item.lifecycle != Lifecycle::Reinstated {
            return Err(RepositoryError::VersionConflict { id: id.to_string() });
        }

        let resource = Self::inject_logical_id(&content.resource, id);
        item.resource = resource.clone();
        item.version += 1;
        item.vaccine_type = content.vaccine_type.clone();
        item.identifier_key = identifier_key;
        item.patient_identifier = patient.identifier_value.clone();
        item.operation = AuditOperation::Update;
        item.updated_at = Utc::now();

        Ok(StoredRecord {
            id: id.to_string(),
            resource,
            version: item.version,
        })
    }

    async fn delete(&self, id: &str, permissions: &VaccinePermissions) -> Result<Value> {
        let mut records = self.records.write().await;

        let Some(item) = records.get_mut(id) else {
            return Err(RepositoryError::NotFound { id: id.to_string() });
        };
        if item.lifecycle.is_deleted() {
            return Err(RepositoryError::NotFound { id: id.to_string() });
        }

        auth::check(Operation::Delete, &item.vaccine_type, permissions)?;

        let previous = item.resource.clone();
        item.lifecycle = Lifecycle::Deleted(Utc::now());
        item.operation = AuditOperation::Delete;
        item.updated_at = Utc::now();

        Ok(previous)
    }

    async fn find_by_patient(
        &self,
        patient_identifier: &str,
        vaccine_types: &BTreeSet<VaccineType>,
    ) -> Result<Vec<StoredRecord>> {
        let records = self.records.read().await;
        let mut found: Vec<StoredRecord> = records
            .iter()
            .filter(|(_, item)| {
                item.patient_identifier.as_deref() == Some(patient_identifier)
                    && !item.lifecycle.is_deleted()
                    && vaccine_types
                        .iter()
                        .any(|requested| requested.matches(item.vaccine_type.as_str()))
            })
            .map(|(id, item)| StoredRecord {
                id: id.clone(),
                resource: item.resource.clone(),
                version: item.version,
            })
            .collect();

        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn permissions(tokens: &[&str]) -> VaccinePermissions {
        VaccinePermissions::new(tokens.iter().copied())
    }

    fn covid_content(identifier_value: &str) -> RecordContent {
        RecordContent {
            resource: json!({"resourceType": "Immunization", "status": "completed"}),
            vaccine_type: VaccineType::new("COVID19"),
            identifier: BusinessIdentifier::new("sys", identifier_value),
        }
    }

    fn patient() -> PatientSubset {
        PatientSubset {
            identifier_value: Some("9000000009".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_id_and_version_one() {
        let repo = InMemoryRepository::new();
        let perms = permissions(&["covid19:create"]);

        let record = repo
            .create(&covid_content("abc"), &patient(), &perms)
            .await
            .unwrap();

        assert_eq!(record.version, 1);
        assert_eq!(record.resource["id"], json!(record.id));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_identifier() {
        let repo = InMemoryRepository::new();
        let perms = permissions(&["covid19:create"]);
        repo.create(&covid_content("abc"), &patient(), &perms)
            .await
            .unwrap();

        let result = repo.create(&covid_content("abc"), &patient(), &perms).await;

        assert_eq!(
            result,
            Err(RepositoryError::DuplicateIdentifier {
                identifier: "sys#abc".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_update_requires_matching_version() {
        let repo = InMemoryRepository::new();
        let perms = permissions(&["covid19:create", "covid19:update"]);
        let record = repo
            .create(&covid_content("abc"), &patient(), &perms)
            .await
            .unwrap();

        let stale = repo
            .update(&record.id, &covid_content("abc"), &patient(), 7, &perms)
            .await;
        assert!(matches!(
            stale,
            Err(RepositoryError::VersionConflict { .. })
        ));

        let updated = repo
            .update(&record.id, &covid_content("abc"), &patient(), 1, &perms)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_update_rejects_record_with_deletion_history() {
        let repo = InMemoryRepository::new();
        let perms = permissions(&[
            "covid19:create",
            "covid19:update",
            "covid19:delete",
        ]);
        let record = repo
            .create(&covid_content("abc"), &patient(), &perms)
            .await
            .unwrap();
        repo.delete(&record.id, &perms).await.unwrap();
        repo.reinstate(&record.id, &covid_content("abc"), &patient(), 1, &perms)
            .await
            .unwrap();

        // A plain update targets never-deleted records only.
        let result = repo
            .update(&record.id, &covid_content("abc"), &patient(), 2, &perms)
            .await;
        assert!(matches!(
            result,
            Err(RepositoryError::VersionConflict { .. })
        ));

        let updated = repo
            .update_reinstated(&record.id, &covid_content("abc"), &patient(), 2, &perms)
            .await
            .unwrap();
        assert_eq!(updated.version, 3);
    }

    #[tokio::test]
    async fn test_double_delete_fails_as_not_found() {
        let repo = InMemoryRepository::new();
        let perms = permissions(&["covid19:create", "covid19:delete"]);
        let record = repo
            .create(&covid_content("abc"), &patient(), &perms)
            .await
            .unwrap();

        repo.delete(&record.id, &perms).await.unwrap();
        let second = repo.delete(&record.id, &perms).await;

        assert_eq!(
            second,
            Err(RepositoryError::NotFound {
                id: record.id.clone()
            })
        );
    }

    #[tokio::test]
    async fn test_deleted_record_is_hidden_from_reads_but_not_metadata() {
        let repo = InMemoryRepository::new();
        let perms = permissions(&["covid19:create", "covid19:read", "covid19:delete"]);
        let record = repo
            .create(&covid_content("abc"), &patient(), &perms)
            .await
            .unwrap();
        repo.delete(&record.id, &perms).await.unwrap();

        assert_eq!(repo.get_by_id(&record.id, &perms).await.unwrap(), None);

        let (_, metadata) = repo.get_metadata(&record.id).await.unwrap().unwrap();
        assert!(metadata.lifecycle.is_deleted());
        assert_eq!(metadata.version, 1);
    }
}
