use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BusinessIdentifier;

/// Vaccine type a record is classified under (e.g. COVID19, FLU).
///
/// The authorization scoping unit. Comparisons are case-insensitive; the
/// original casing is preserved for storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VaccineType(String);

impl VaccineType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercased form used for permission tokens and type filters.
    pub fn lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for VaccineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a stored record.
///
/// The stored `DeletedAt` attribute is tri-state (absent, deletion
/// timestamp, or the literal reinstated marker); this is the in-domain
/// mapping, produced and consumed only at the storage conversion boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never deleted.
    Active,
    /// Logically deleted at the given instant; hidden from reads.
    Deleted(DateTime<Utc>),
    /// Deleted and since reinstated; active again, history retained.
    Reinstated,
}

impl Lifecycle {
    /// True when the record is currently hidden from reads.
    pub fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::Deleted(_))
    }

    /// True when the record has ever passed through a delete, whether or
    /// not it is active now.
    pub fn has_deletion_history(&self) -> bool {
        !matches!(self, Lifecycle::Active)
    }
}

/// The mutation kind recorded against each write.
///
/// An audit value for downstream change-data-capture consumers; never read
/// back by this layer's own logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Create => "CREATE",
            AuditOperation::Update => "UPDATE",
            AuditOperation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Patient details extracted from a validated payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSubset {
    /// The patient's identifier value (NHS number), when the payload
    /// carries one.
    pub identifier_value: Option<String>,
}

/// Validated content ready for persistence.
///
/// The payload is opaque to the repository and passed through verbatim;
/// the vaccine type and business identifier are the index fields the
/// validator extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordContent {
    pub resource: Value,
    pub vaccine_type: VaccineType,
    pub identifier: BusinessIdentifier,
}

/// Output of the content validator collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedImmunization {
    pub content: RecordContent,
    pub patient: PatientSubset,
}

/// A record as returned from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    /// Server-assigned logical id, immutable for the record's lifetime.
    pub id: String,
    pub resource: Value,
    pub version: u64,
}

/// Routing metadata for an existing record, read without hiding deleted
/// records.
///
/// The identifier is derived from the indexed key rather than the payload;
/// the two may legitimately diverge after historic data uplifts.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    pub identifier: BusinessIdentifier,
    pub version: u64,
    pub lifecycle: Lifecycle,
    pub vaccine_type: VaccineType,
}
