use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::VaccinePermissions;
use crate::record::{
    BusinessIdentifier, PatientSubset, RecordContent, RecordMetadata, StoredRecord, VaccineType,
};

use super::Result;

/// Durable persistence for immunization records.
///
/// Backends enforce per-record optimistic concurrency through single-item
/// conditional writes; no multi-item transaction is assumed. Every
/// operation takes the caller's capability set and re-checks the record's
/// vaccine type even when the record was located by primary key, so a
/// caller who can enumerate logical ids is still refused when
/// unauthorized.
#[async_trait]
pub trait ImmunizationRepository: Send + Sync {
    /// Persists a new record under a freshly generated logical id.
    ///
    /// Any caller-supplied id in the payload is discarded. Fails with
    /// [`RepositoryError::DuplicateIdentifier`] when the business
    /// identifier is already indexed for another record. The identifier
    /// index is eventually consistent, so two concurrent creates can both
    /// pass the check; that window is accepted and documented rather than
    /// closed.
    ///
    /// [`RepositoryError::DuplicateIdentifier`]: super::RepositoryError::DuplicateIdentifier
    async fn create(
        &self,
        content: &RecordContent,
        patient: &PatientSubset,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord>;

    /// Point lookup by logical id.
    ///
    /// Returns `None` when the record is absent or logically deleted.
    async fn get_by_id(
        &self,
        id: &str,
        permissions: &VaccinePermissions,
    ) -> Result<Option<StoredRecord>>;

    /// Reads a record's payload and routing metadata without hiding
    /// deleted records.
    ///
    /// Callers are responsible for authorization before acting on the
    /// result; the metadata is never returned to API callers directly.
    async fn get_metadata(&self, id: &str) -> Result<Option<(Value, RecordMetadata)>>;

    /// Identifier-index lookup; returns the record in any lifecycle state.
    async fn get_by_identifier(
        &self,
        identifier: &BusinessIdentifier,
        permissions: &VaccinePermissions,
    ) -> Result<Option<StoredRecord>>;

    /// Replaces the content of an active, never-deleted record.
    ///
    /// The write is conditioned on the stored version matching
    /// `expected_version`; on success the new version is
    /// `expected_version + 1`. A mismatch is rejected atomically by the
    /// store and surfaced as a conflict, never silently overwritten.
    async fn update(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord>;

    /// Brings a logically deleted record back to active, marking its
    /// deletion history.
    async fn reinstate(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord>;

    /// Replaces the content of a record that is active with a reinstate
    /// history.
    async fn update_reinstated(
        &self,
        id: &str,
        content: &RecordContent,
        patient: &PatientSubset,
        expected_version: u64,
        permissions: &VaccinePermissions,
    ) -> Result<StoredRecord>;

    /// Logically deletes an active record, returning the previous payload
    /// for audit consumers.
    ///
    /// The lifecycle precondition is enforced by the store, not by a prior
    /// read, so concurrent double deletes fail deterministically as
    /// not-found.
    async fn delete(&self, id: &str, permissions: &VaccinePermissions) -> Result<Value>;

    /// All of a patient's active (or reinstated) records for the given
    /// vaccine types.
    async fn find_by_patient(
        &self,
        patient_identifier: &str,
        vaccine_types: &BTreeSet<VaccineType>,
    ) -> Result<Vec<StoredRecord>>;
}
