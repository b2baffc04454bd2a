use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::record::VaccineType;

/// API operation a permission token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Search,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Search => "search",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied capability set of `"{vaccineType}:{operation}"` tokens.
///
/// Tokens are case-insensitive; membership is tested on the lowercased
/// form. The comma-separated header string is the serialized form of this
/// set, never interpreted beyond the `type:operation` split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaccinePermissions(BTreeSet<String>);

impl VaccinePermissions {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tokens
                .into_iter()
                .map(|token| token.as_ref().trim().to_ascii_lowercase())
                .filter(|token| !token.is_empty())
                .collect(),
        )
    }

    /// True when the set contains the `{type}:{operation}` token.
    pub fn grants(&self, vaccine_type: &VaccineType, operation: Operation) -> bool {
        self.0
            .contains(&format!("{}:{}", vaccine_type.lowercase(), operation))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for VaccinePermissions {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}
