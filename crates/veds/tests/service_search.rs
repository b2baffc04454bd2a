//! Service-level tests for authorization scoping, partial search
//! authorization, and redaction profile selection.

mod common;

use std::collections::BTreeSet;

use serde_json::json;

use veds::service::{ImmunizationService, ServiceError};
use veds::storage::InMemoryRepository;
use veds_core::auth::AuthError;
use veds_core::external::PatientFlag;
use veds_core::record::VaccineType;
use veds_core::storage::RepositoryError;

use common::{covid_resource, flu_resource, permissions, StubDirectory, StubValidator, NHS_NUMBER};

fn service_with_directory(
    repository: InMemoryRepository,
    directory: StubDirectory,
) -> ImmunizationService<InMemoryRepository, StubValidator, StubDirectory> {
    ImmunizationService::new(repository, StubValidator, directory)
}

fn types(names: &[&str]) -> BTreeSet<VaccineType> {
    names.iter().map(|name| VaccineType::new(*name)).collect()
}

/// One COVID-19 and one flu record for the same patient, created through
/// the service.
async fn seed_repository() -> InMemoryRepository {
    let repository = InMemoryRepository::new();
    let service = service_with_directory(
        repository.clone(),
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );
    let perms = permissions(&["covid19:create", "flu:create"]);
    service
        .create(covid_resource("covid-1"), &perms)
        .await
        .unwrap();
    service.create(flu_resource("flu-1"), &perms).await.unwrap();
    repository
}

#[tokio::test]
async fn test_record_is_only_readable_with_its_vaccine_type_permission() {
    let repository = InMemoryRepository::new();
    let service = service_with_directory(
        repository.clone(),
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );
    let created = service
        .create(
            covid_resource("abc"),
            &permissions(&["covid19:create"]),
        )
        .await
        .unwrap();

    // A flu-scoped caller is refused even though it has the logical id.
    let refused = service
        .get_by_id(&created.id, &permissions(&["flu:read"]))
        .await;
    assert!(matches!(
        refused,
        Err(ServiceError::Repository(RepositoryError::Unauthorized(
            AuthError::MissingPermission { .. }
        )))
    ));

    let allowed = service
        .get_by_id(&created.id, &permissions(&["covid19:read"]))
        .await;
    assert!(allowed.is_ok());
}

#[tokio::test]
async fn test_identifier_lookup_requires_search_permission() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );
    let identifier =
        veds_core::record::BusinessIdentifier::new(common::IDENTIFIER_SYSTEM, "covid-1");

    let refused = service
        .get_by_identifier(&identifier, &permissions(&["covid19:read"]))
        .await;
    assert!(matches!(
        refused,
        Err(ServiceError::Repository(RepositoryError::Unauthorized(_)))
    ));

    let allowed = service
        .get_by_identifier(&identifier, &permissions(&["covid19:search"]))
        .await;
    assert!(allowed.is_ok());
}

#[tokio::test]
async fn test_search_with_no_permitted_type_fails_hard() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );

    let result = service
        .search(
            NHS_NUMBER,
            &types(&["COVID19", "FLU"]),
            &permissions(&["mmr:search"]),
        )
        .await;

    assert_eq!(
        result,
        Err(ServiceError::Repository(RepositoryError::Unauthorized(
            AuthError::NoSearchableTypes
        )))
    );
}

#[tokio::test]
async fn test_search_silently_drops_unauthorized_types_and_flags_it() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );

    let outcome = service
        .search(
            NHS_NUMBER,
            &types(&["COVID19", "FLU"]),
            &permissions(&["covid19:search"]),
        )
        .await
        .unwrap();

    assert!(outcome.types_filtered);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(
        outcome.records[0].resource["identifier"][0]["value"],
        json!("covid-1")
    );
}

#[tokio::test]
async fn test_search_with_all_types_permitted_is_not_flagged() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );

    let outcome = service
        .search(
            NHS_NUMBER,
            &types(&["COVID19", "FLU"]),
            &permissions(&["covid19:search", "flu:search"]),
        )
        .await
        .unwrap();

    assert!(!outcome.types_filtered);
    assert_eq!(outcome.records.len(), 2);
}

#[tokio::test]
async fn test_search_excludes_deleted_records() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );
    let perms = permissions(&["covid19:search", "covid19:delete", "flu:search"]);

    let outcome = service
        .search(NHS_NUMBER, &types(&["COVID19", "FLU"]), &perms)
        .await
        .unwrap();
    let covid_record = outcome
        .records
        .iter()
        .find(|r| r.resource["identifier"][0]["value"] == json!("covid-1"))
        .unwrap();
    service.delete(&covid_record.id, &perms).await.unwrap();

    let outcome = service
        .search(NHS_NUMBER, &types(&["COVID19", "FLU"]), &perms)
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(
        outcome.records[0].resource["identifier"][0]["value"],
        json!("flu-1")
    );
}

#[tokio::test]
async fn test_search_applies_search_profile() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );

    let outcome = service
        .search(NHS_NUMBER, &types(&["COVID19"]), &permissions(&["covid19:search"]))
        .await
        .unwrap();

    let resource = &outcome.records[0].resource;
    assert!(resource.get("contained").is_none());
    assert!(resource["patient"]["reference"]
        .as_str()
        .unwrap()
        .starts_with("urn:uuid:"));
    assert_eq!(resource["patient"]["identifier"]["value"], json!(NHS_NUMBER));
    // The unrestricted profile keeps the venue.
    assert!(resource.get("location").is_some());
}

#[tokio::test]
async fn test_restricted_patient_search_applies_stricter_profile() {
    let repository = seed_repository().await;
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Restricted),
    );

    let outcome = service
        .search(NHS_NUMBER, &types(&["COVID19"]), &permissions(&["covid19:search"]))
        .await
        .unwrap();

    let resource = &outcome.records[0].resource;
    assert!(resource.get("location").is_none());
    assert_eq!(
        resource["performer"][0]["actor"]["identifier"]["value"],
        json!("N2N9I")
    );
}

#[tokio::test]
async fn test_directory_failure_never_selects_the_weaker_profile() {
    let repository = seed_repository().await;
    let service = service_with_directory(repository, StubDirectory::Failing);

    let outcome = service
        .search(NHS_NUMBER, &types(&["COVID19"]), &permissions(&["covid19:search"]))
        .await
        .unwrap();

    // The lookup failed, so the restricted overlay applies.
    let resource = &outcome.records[0].resource;
    assert!(resource.get("location").is_none());
}

#[tokio::test]
async fn test_read_applies_restricted_overlay_for_flagged_patient() {
    let repository = InMemoryRepository::new();
    let create_service = service_with_directory(
        repository.clone(),
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );
    let created = create_service
        .create(covid_resource("abc"), &permissions(&["covid19:create"]))
        .await
        .unwrap();

    let read_service =
        service_with_directory(repository, StubDirectory::Flag(PatientFlag::Restricted));
    let view = read_service
        .get_by_id(&created.id, &permissions(&["covid19:read"]))
        .await
        .unwrap();

    assert!(view.resource.get("location").is_none());
    assert_eq!(
        view.resource["contained"][1]["address"][0]["postalCode"],
        json!("ZZ99 3CZ")
    );
    assert!(view.resource["contained"][1]["address"][0]
        .get("city")
        .is_none());
}

#[tokio::test]
async fn test_unrestricted_read_keeps_the_full_payload() {
    let repository = InMemoryRepository::new();
    let service = service_with_directory(
        repository,
        StubDirectory::Flag(PatientFlag::Unrestricted),
    );
    let created = service
        .create(covid_resource("abc"), &permissions(&["covid19:create"]))
        .await
        .unwrap();

    let view = service
        .get_by_id(&created.id, &permissions(&["covid19:read"]))
        .await
        .unwrap();

    assert!(view.resource.get("location").is_some());
    assert_eq!(
        view.resource["contained"][1]["address"][0]["postalCode"],
        json!("LS1 4AP")
    );
    // The read profile drops the reference to the contained practitioner.
    assert_eq!(view.resource["performer"].as_array().unwrap().len(), 1);
}
