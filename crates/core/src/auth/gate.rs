use std::collections::BTreeSet;

use crate::record::VaccineType;

use super::{AuthError, Operation, VaccinePermissions};

/// Checks that the caller holds the `{type}:{operation}` capability.
///
/// Single-record operations fail hard when the token is absent; partial
/// authorization applies only to multi-type search via [`permitted_types`].
pub fn check(
    operation: Operation,
    vaccine_type: &VaccineType,
    permissions: &VaccinePermissions,
) -> Result<(), AuthError> {
    if permissions.grants(vaccine_type, operation) {
        Ok(())
    } else {
        Err(AuthError::MissingPermission {
            vaccine_type: vaccine_type.as_str().to_string(),
            operation,
        })
    }
}

/// Filters a requested vaccine-type set down to the subset the caller is
/// authorized for.
///
/// Never fails; callers detect silently dropped types by comparing set
/// sizes against the original request.
pub fn permitted_types(
    operation: Operation,
    requested: &BTreeSet<VaccineType>,
    permissions: &VaccinePermissions,
) -> BTreeSet<VaccineType> {
    requested
        .iter()
        .filter(|vaccine_type| permissions.grants(vaccine_type, operation))
        .cloned()
        .collect()
}
