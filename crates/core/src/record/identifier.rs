use std::fmt;

use serde::{Deserialize, Serialize};

/// Supplier-assigned business identifier for an immunization event.
///
/// The `(system, value)` pair must be unique across the whole store. The
/// storage key form (`<system>#<value>`) is what the identifier index is
/// partitioned on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessIdentifier {
    pub system: String,
    pub value: String,
}

impl BusinessIdentifier {
    /// Creates a new identifier from a system URI and supplier-local value.
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            value: value.into(),
        }
    }

    /// The partition key form used by the identifier index.
    pub fn storage_key(&self) -> String {
        format!("{}#{}", self.system, self.value)
    }

    /// Parses the `<system>#<value>` storage key form.
    ///
    /// The value segment may itself contain `#`, so only the first
    /// separator splits.
    pub fn parse_storage_key(key: &str) -> Option<Self> {
        let (system, value) = key.split_once('#')?;
        Some(Self::new(system, value))
    }
}

impl fmt::Display for BusinessIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.system, self.value)
    }
}
