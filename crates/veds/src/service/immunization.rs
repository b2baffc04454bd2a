use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use veds_core::auth::{self, Operation, VaccinePermissions};
use veds_core::external::{ContentValidator, PatientDirectory, PatientFlag, ValidationFailure};
use veds_core::record::{BusinessIdentifier, Lifecycle, StoredRecord, VaccineType};
use veds_core::storage::{ImmunizationRepository, RepositoryError};

use super::error::ServiceError;
use super::redaction;

/// A redacted record as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub id: String,
    pub resource: Value,
    pub version: u64,
}

/// Pointer response for identifier-based lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierView {
    pub id: String,
    pub version: u64,
}

/// Patient search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub records: Vec<RecordView>,
    /// True when some requested vaccine types were silently dropped
    /// because the caller holds no search permission for them.
    pub types_filtered: bool,
}

/// Orchestrates a request against the repository: authorization first,
/// then content validation, then the lifecycle routing decision, then the
/// single repository call, with redaction applied to whatever comes back.
pub struct ImmunizationService<R, V, P> {
    repository: R,
    validator: V,
    directory: P,
}

impl<R, V, P> ImmunizationService<R, V, P>
where
    R: ImmunizationRepository,
    V: ContentValidator,
    P: PatientDirectory,
{
    pub fn new(repository: R, validator: V, directory: P) -> Self {
        Self {
            repository,
            validator,
            directory,
        }
    }

    /// Creates a new record from a submitted resource.
    ///
    /// The logical id is server-assigned; a caller-supplied id is rejected
    /// outright rather than silently replaced.
    pub async fn create(
        &self,
        resource: Value,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord, ServiceError> {
        if resource.get("id").is_some() {
            return Err(
                ValidationFailure::new("id field must not be present for a create").into(),
            );
        }

        let validated = self.validator.validate(&resource).await?;
        let record = self
            .repository
            .create(&validated.content, &validated.patient, permissions)
            .await?;

        Ok(record)
    }

    /// Direct-by-id fetch with the read redaction profile applied.
    pub async fn get_by_id(
        &self,
        id: &str,
        permissions: &VaccinePermissions,
    ) -> Result<RecordView, ServiceError> {
        let Some(record) = self.repository.get_by_id(id, permissions).await? else {
            return Err(ServiceError::NotFound { id: id.to_string() });
        };

        let resource = redaction::read_profile(record.resource);
        let resource = self.apply_patient_flag(resource).await;

        Ok(RecordView {
            id: record.id,
            resource,
            version: record.version,
        })
    }

    /// Identifier-based fetch: a pointer to the record, whatever its
    /// lifecycle state.
    pub async fn get_by_identifier(
        &self,
        identifier: &BusinessIdentifier,
        permissions: &VaccinePermissions,
    ) -> Result<Option<IdentifierView>, ServiceError> {
        let Some(record) = self
            .repository
            .get_by_identifier(identifier, permissions)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(IdentifierView {
            id: record.id,
            version: record.version,
        }))
    }

    /// Updates an existing record, routing through the lifecycle state
    /// machine.
    ///
    /// An update of a logically deleted record reinstates it; the version
    /// header is ignored there because a deleted record has no
    /// client-visible current version. Everywhere else a supplied version
    /// that does not match the stored one is rejected before any
    /// repository write.
    pub async fn update(
        &self,
        id: &str,
        resource: Value,
        expected_version: Option<u64>,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord, ServiceError> {
        let validated = self.validator.validate(&resource).await?;

        let Some((_, metadata)) = self.repository.get_metadata(id).await? else {
            return Err(ServiceError::NotFound { id: id.to_string() });
        };

        // The business identifier is immutable across updates; it is
        // compared against the indexed key, which is authoritative even
        // where the stored payload disagrees.
        if metadata.identifier != validated.content.identifier {
            return Err(ValidationFailure::new(
                "identifier system and value do not match the stored record",
            )
            .into());
        }

        let record = match metadata.lifecycle {
            Lifecycle::Deleted(_) => {
                self.repository
                    .reinstate(
                        id,
                        &validated.content,
                        &validated.patient,
                        metadata.version,
                        permissions,
                    )
                    .await?
            }
            Lifecycle::Active | Lifecycle::Reinstated => {
                if let Some(expected) = expected_version {
                    if expected != metadata.version {
                        return Err(
                            RepositoryError::VersionConflict { id: id.to_string() }.into()
                        );
                    }
                }
                if metadata.lifecycle == Lifecycle::Reinstated {
                    self.repository
                        .update_reinstated(
                            id,
                            &validated.content,
                            &validated.patient,
                            metadata.version,
                            permissions,
                        )
                        .await?
                } else {
                    self.repository
                        .update(
                            id,
                            &validated.content,
                            &validated.patient,
                            metadata.version,
                            permissions,
                        )
                        .await?
                }
            }
        };

        Ok(record)
    }

    /// Logically deletes a record, returning the previous payload for
    /// audit consumers. Repeated deletes fail as not-found.
    pub async fn delete(
        &self,
        id: &str,
        permissions: &VaccinePermissions,
    ) -> Result<Value, ServiceError> {
        Ok(self.repository.delete(id, permissions).await?)
    }

    /// Patient-scoped search across the requested vaccine types.
    ///
    /// Partial authorization: unauthorized types are silently dropped and
    /// flagged on the outcome; only a request with no permitted type at
    /// all fails hard.
    pub async fn search(
        &self,
        patient_identifier: &str,
        requested: &BTreeSet<VaccineType>,
        permissions: &VaccinePermissions,
    ) -> Result<SearchOutcome, ServiceError> {
        let permitted = auth::permitted_types(Operation::Search, requested, permissions);
        if permitted.is_empty() {
            return Err(RepositoryError::from(auth::AuthError::NoSearchableTypes).into());
        }
        let types_filtered = permitted.len() != requested.len();

        let records = self
            .repository
            .find_by_patient(patient_identifier, &permitted)
            .await?;

        let flag = match self.directory.patient_flag(patient_identifier).await {
            Ok(flag) => flag,
            Err(err) => {
                // Never fall back to the less restrictive profile when the
                // directory cannot be reached.
                tracing::warn!(error = %err, "patient flag lookup failed, applying restricted profile");
                PatientFlag::Restricted
            }
        };

        // Intra-bundle URN referencing the patient resource; assigned per
        // search response, not resolvable externally.
        let patient_full_url = format!("urn:uuid:{}", Uuid::new_v4());

        let records = records
            .into_iter()
            .map(|record| {
                let mut resource = redaction::search_profile(record.resource, &patient_full_url);
                if flag == PatientFlag::Restricted {
                    resource = redaction::restricted_overlay(resource);
                }
                RecordView {
                    id: record.id,
                    resource,
                    version: record.version,
                }
            })
            .collect();

        Ok(SearchOutcome {
            records,
            types_filtered,
        })
    }

    /// Selects the redaction overlay from the patient flag.
    ///
    /// Records without a patient identifier skip the lookup entirely; a
    /// failed lookup applies the restricted overlay.
    async fn apply_patient_flag(&self, resource: Value) -> Value {
        let Some(nhs_number) = redaction::patient_identifier_value(&resource) else {
            return resource;
        };

        match self.directory.patient_flag(&nhs_number).await {
            Ok(PatientFlag::Unrestricted) => resource,
            Ok(PatientFlag::Restricted) => redaction::restricted_overlay(resource),
            Err(err) => {
                tracing::warn!(error = %err, "patient flag lookup failed, applying restricted profile");
                redaction::restricted_overlay(resource)
            }
        }
    }
}
