//! DynamoDB repository implementation.
//!
//! Implements the repository trait from `veds_core::storage` using
//! single-item conditional writes. There is no multi-item transaction:
//! version preconditions and lifecycle sentinels are enforced per item by
//! the store, and the identifier-uniqueness check is a read-before-write
//! against an eventually consistent index.

use std::collections::BTreeSet;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use veds_core::auth::{self, Operation, VaccinePermissions};
use veds_core::record::{
    AuditOperation, BusinessIdentifier, PatientSubset, RecordContent, RecordMetadata, StoredRecord,
    VaccineType,
};
use veds_core::storage::{ImmunizationRepository, RepositoryError, Result};

use crate::config::Config;

use super::conversions::{self, Item};
use super::error::{
    map_delete_error, map_get_item_error, map_mutation_error, map_put_item_error, map_query_error,
};
use super::keys;

/// Which version-conditioned mutation is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    /// Active record without deletion history (`DeletedAt` absent).
    Update,
    /// Logically deleted record coming back to active.
    Reinstate,
    /// Active record with a reinstate history (`DeletedAt = "reinstated"`).
    UpdateReinstated,
}

/// DynamoDB-backed record store.
pub struct DynamoDbRepository {
    client: Client,
    table_name: String,
}

impl DynamoDbRepository {
    /// Creates a new repository with the given DynamoDB client and table name.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Creates a repository from environment configuration, using the AWS
    /// SDK default credential chain.
    pub async fn from_env() -> Self {
        Self::from_config(&Config::from_env()).await
    }

    /// Creates a repository from an explicit [`Config`], honouring the
    /// local endpoint override.
    pub async fn from_config(config: &Config) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&aws_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), config.table_name.clone())
    }

    /// Get the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(keys::immunization_pk(id)))
            .send()
            .await
            .map_err(map_get_item_error)?;

        Ok(result.item)
    }

    /// First identifier-index hit for the given business identifier, if any.
    async fn query_identifier(&self, identifier: &BusinessIdentifier) -> Result<Option<Item>> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(keys::IDENTIFIER_GSI)
            .key_condition_expression("IdentifierPK = :identifier")
            .expression_attribute_values(
                ":identifier",
                AttributeValue::S(identifier.storage_key()),
            )
            .limit(1)
            .send()
            .await
            .map_err(map_query_error)?;

        Ok(result.items.unwrap_or_default().into_iter().next())
    }

    /// Read-before-write deduplication check.
    ///
    /// An index hit bound to a different primary key rejects the write.
    /// The index is eventually consistent, so two concurrent writers can
    /// both pass; that window is accepted (see the crate docs) rather than
    /// closed.
    async fn ensure_identifier_unclaimed(
        &self,
        identifier: &BusinessIdentifier,
        own_pk: Option<&str>,
    ) -> Result<()> {
        if let Some(item) = self.query_identifier(identifier).await? {
            let claimed_by = item.get("PK").and_then(|v| v.as_s().ok());
            if claimed_by.map(String::as_str) != own_pk {
                return Err(RepositoryError::DuplicateIdentifier {
                    identifier: identifier.storage_key(),
                });
            }
        }
        Ok(())
    }

    /// Writes one of the version-conditioned mutations.
    ///
    /// The condition always pins the primary key (so a missing record can
    /// never be upserted into existence), the expected version, and the
    /// lifecycle sentinel the transition requires.
    async fn write_record(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        kind: MutationKind,
    ) -> Result<StoredRecord> {
        let resource = conversions::with_logical_id(&content.resource, id);
        let serialized = conversions::serialize_resource(&resource)?;
        let new_version = expected_version + 1;

        let mut update_expression = String::from(
            "SET UpdatedAt = :updated_at, PatientPK = :patient_pk, PatientSK = :patient_sk, \
             #resource = :resource, Operation = :operation, Version = :version",
        );
        if kind == MutationKind::Reinstate {
            update_expression.push_str(", DeletedAt = :reinstated, Reinstated = :has_history");
        }

        let condition_expression = match kind {
            MutationKind::Update => {
                "PK = :pk AND Version = :expected AND attribute_not_exists(DeletedAt)"
            }
            MutationKind::Reinstate => {
                "PK = :pk AND Version = :expected AND attribute_exists(DeletedAt)"
            }
            MutationKind::UpdateReinstated => {
                "PK = :pk AND Version = :expected AND DeletedAt = :reinstated"
            }
        };

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(keys::immunization_pk(id)))
            .update_expression(update_expression)
            .condition_expression(condition_expression)
            // "Resource" is a DynamoDB reserved word.
            .expression_attribute_names("#resource", "Resource")
            .expression_attribute_values(":pk", AttributeValue::S(keys::immunization_pk(id)))
            .expression_attribute_values(
                ":expected",
                AttributeValue::N(expected_version.to_string()),
            )
            .expression_attribute_values(
                ":updated_at",
                AttributeValue::N(Utc::now().timestamp().to_string()),
            )
            .expression_attribute_values(
                ":patient_pk",
                AttributeValue::S(keys::patient_pk(patient.identifier_value.as_deref())),
            )
            .expression_attribute_values(
                ":patient_sk",
                AttributeValue::S(keys::patient_sk(&content.vaccine_type, id)),
            )
            .expression_attribute_values(":resource", AttributeValue::S(serialized))
            .expression_attribute_values(
                ":operation",
                AttributeValue::S(AuditOperation::Update.to_string()),
            )
            .expression_attribute_values(":version", AttributeValue::N(new_version.to_string()));

        if matches!(kind, MutationKind::Reinstate | MutationKind::UpdateReinstated) {
            request = request.expression_attribute_values(
                ":reinstated",
                AttributeValue::S(keys::REINSTATED_MARKER.to_string()),
            );
        }
        if kind == MutationKind::Reinstate {
            request = request.expression_attribute_values(":has_history", AttributeValue::Bool(true));
        }

        request
            .send()
            .await
            .map_err(|err| map_mutation_error(err, id))?;

        tracing::debug!(%id, version = new_version, ?kind, "updated immunization record");

        Ok(StoredRecord {
            id: id.to_string(),
            resource,
            version: new_version,
        })
    }
}

#[async_trait]
impl ImmunizationRepository for DynamoDbRepository {
    async fn create(
        &self,
        content: &RecordContent,
        patient: &PatientSubset,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord> {
        auth::check(Operation::Create, &content.vaccine_type, permissions)?;
        self.ensure_identifier_unclaimed(&content.identifier, None)
            .await?;

        let id = Uuid::new_v4().to_string();
        let resource = conversions::with_logical_id(&content.resource, &id);
        let item = conversions::new_record_item(&id, &resource, content, patient, Utc::now())?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await
            .map_err(|err| map_put_item_error(err, &id))?;

        tracing::debug!(%id, vaccine_type = %content.vaccine_type, "created immunization record");

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
        let Some(item) = self.get_item(id).await? else {
            return Ok(None);
        };

        if conversions::lifecycle_from_item(&item)?.is_deleted() {
            return Ok(None);
        }

        let vaccine_type = conversions::vaccine_type_from_item(&item)?;
        auth::check(Operation::Read, &vaccine_type, permissions)?;

        Ok(Some(conversions::item_to_record(&item)?))
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<(Value, RecordMetadata)>> {
        let Some(item) = self.get_item(id).await? else {
            return Ok(None);
        };

        let resource = conversions::parse_resource(&item)?;
        let metadata = conversions::metadata_from_item(&item)?;

        Ok(Some((resource, metadata)))
    }

    async fn get_by_identifier(
        &self,
        identifier: &BusinessIdentifier,
        permissions: &VaccinePermissions,
    ) -> Result<Option<StoredRecord>> {
        let Some(item) = self.query_identifier(identifier).await? else {
            return Ok(None);
        };

        let vaccine_type = conversions::vaccine_type_from_item(&item)?;
        auth::check(Operation::Search, &vaccine_type, permissions)?;

        Ok(Some(conversions::item_to_record(&item)?))
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
        self.ensure_identifier_unclaimed(&content.identifier, Some(&keys::immunization_pk(id)))
            .await?;
        self.write_record(id, content, patient, expected_version, MutationKind::Update)
            .await
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
        self.ensure_identifier_unclaimed(&content.identifier, Some(&keys::immunization_pk(id)))
            .await?;
        self.write_record(
            id,
            content,
            patient,
            expected_version,
            MutationKind::Reinstate,
        )
        .await
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
        self.ensure_identifier_unclaimed(&content.identifier, Some(&keys::immunization_pk(id)))
            .await?;
        self.write_record(
            id,
            content,
            patient,
            expected_version,
            MutationKind::UpdateReinstated,
        )
        .await
    }

    async fn delete(&self, id: &str, permissions: &VaccinePermissions) -> Result<Value> {
        // The permission check reads the stored vaccine type first; the
        // lifecycle precondition itself is enforced by the store, so a
        // concurrent double delete fails deterministically instead of
        // racing the read.
        if let Some(item) = self.get_item(id).await? {
            if !conversions::lifecycle_from_item(&item)?.is_deleted() {
                let vaccine_type = conversions::vaccine_type_from_item(&item)?;
                auth::check(Operation::Delete, &vaccine_type, permissions)?;
            }
        }

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(keys::immunization_pk(id)))
            .update_expression("SET DeletedAt = :deleted_at, Operation = :operation")
            .condition_expression(
                "PK = :pk AND (attribute_not_exists(DeletedAt) OR DeletedAt = :reinstated)",
            )
            .expression_attribute_values(
                ":deleted_at",
                AttributeValue::N(Utc::now().timestamp().to_string()),
            )
            .expression_attribute_values(
                ":operation",
                AttributeValue::S(AuditOperation::Delete.to_string()),
            )
            .expression_attribute_values(":pk", AttributeValue::S(keys::immunization_pk(id)))
            .expression_attribute_values(
                ":reinstated",
                AttributeValue::S(keys::REINSTATED_MARKER.to_string()),
            )
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|err| map_delete_error(err, id))?;

        tracing::debug!(%id, "logically deleted immunization record");

        let previous = result.attributes.ok_or_else(|| {
            RepositoryError::QueryFailed("Delete returned no previous attributes".to_string())
        })?;
        conversions::parse_resource(&previous)
    }

    async fn find_by_patient(
        &self,
        patient_identifier: &str,
        vaccine_types: &BTreeSet<VaccineType>,
    ) -> Result<Vec<StoredRecord>> {
        let requested: BTreeSet<String> =
            vaccine_types.iter().map(VaccineType::lowercase).collect();

        let mut items: Vec<Item> = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;

        // Paginate through the whole partition; the store caps each page.
        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(keys::PATIENT_GSI)
                .key_condition_expression("PatientPK = :patient_pk")
                .filter_expression(
                    "attribute_not_exists(DeletedAt) OR DeletedAt = :reinstated",
                )
                .expression_attribute_values(
                    ":patient_pk",
                    AttributeValue::S(keys::patient_pk(Some(patient_identifier))),
                )
                .expression_attribute_values(
                    ":reinstated",
                    AttributeValue::S(keys::REINSTATED_MARKER.to_string()),
                );
            if let Some(key) = exclusive_start_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let result = request.send().await.map_err(map_query_error)?;
            items.extend(result.items.unwrap_or_default());

            match result.last_evaluated_key {
                Some(key) => exclusive_start_key = Some(key),
                None => break,
            }
        }

        if items.is_empty() {
            tracing::warn!("no items matched the patient identifier filter");
        }

        let mut records = Vec::new();
        for item in &items {
            let vaccine_type = conversions::vaccine_type_from_item(item)?;
            if requested.contains(&vaccine_type.lowercase()) {
                records.push(conversions::item_to_record(item)?);
            }
        }

        Ok(records)
    }
}
