//! User repository tests against an in-memory database
//!
//! Run with: cargo test --package gatehouse-storage --test user_repository

use gatehouse_core::{RegistrationKind, RegistrationUpdate, Uid};
use gatehouse_storage::{Database, NewUser, SqliteUserRepository, StorageError, UserRepository};
use rstest::rstest;

async fn repository() -> SqliteUserRepository {
    Database::in_memory().await.unwrap().users()
}

fn uid(value: u64) -> Uid {
    Uid::new(value).unwrap()
}

#[tokio::test]
async fn test_create_and_find() {
    let users = repository().await;

    let created = users
        .create(
            &NewUser::new("Ana", "ana@example.com")
                .department("Security")
                .zkteco_uid(uid(12)),
        )
        .await
        .unwrap();

    assert_eq!(created.status, "active");
    assert!(!created.card_registered);
    assert_eq!(created.department.as_deref(), Some("Security"));
    assert_eq!(created.terminal_uid(), Some(uid(12)));

    let by_uid = users.find_by_zkteco_uid(uid(12)).await.unwrap().unwrap();
    assert_eq!(by_uid.id, created.id);
    assert!(users.find_by_zkteco_uid(uid(13)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_terminal_uid_rejected() {
    let users = repository().await;
    users
        .create(&NewUser::new("Ana", "ana@example.com").zkteco_uid(uid(5)))
        .await
        .unwrap();

    let err = users
        .create(&NewUser::new("Bo", "bo@example.com").zkteco_uid(uid(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Database(_)));
}

#[rstest]
#[case::fingerprint(RegistrationKind::Fingerprint)]
#[case::palm(RegistrationKind::Palm)]
#[case::face(RegistrationKind::Face)]
#[tokio::test]
async fn test_set_registration_flag(#[case] kind: RegistrationKind) {
    let users = repository().await;
    let user = users.create(&NewUser::new("Ana", "ana@example.com")).await.unwrap();

    let updated = users.set_registration(&user.id, kind, true, None).await.unwrap();
    assert!(updated.is_registered(kind));
    assert!(!updated.card_registered);

    let cleared = users.set_registration(&user.id, kind, false, None).await.unwrap();
    assert!(!cleared.is_registered(kind));
}

#[tokio::test]
async fn test_card_registration_tracks_number() {
    let users = repository().await;
    let user = users
        .create(&NewUser::new("Ana", "ana@example.com").zkteco_uid(uid(7)))
        .await
        .unwrap();

    let register = RegistrationUpdate {
        uid: uid(7),
        kind: RegistrationKind::Card,
        registered: true,
        card_number: Some("0012345".to_string()),
    };
    let updated = users.apply_registration(&register).await.unwrap();
    assert!(updated.card_registered);
    assert_eq!(updated.card_number.as_deref(), Some("0012345"));

    // Re-registering without a number keeps the stored one.
    let again = users
        .set_registration(&user.id, RegistrationKind::Card, true, None)
        .await
        .unwrap();
    assert_eq!(again.card_number.as_deref(), Some("0012345"));

    let delete = RegistrationUpdate {
        registered: false,
        card_number: None,
        ..register
    };
    let cleared = users.apply_registration(&delete).await.unwrap();
    assert!(!cleared.card_registered);
    assert_eq!(cleared.card_number, None);
}

#[tokio::test]
async fn test_apply_registration_unknown_uid() {
    let users = repository().await;
    let update = RegistrationUpdate {
        uid: uid(99),
        kind: RegistrationKind::Fingerprint,
        registered: true,
        card_number: None,
    };

    let err = users.apply_registration(&update).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Entity not found: User with zkteco_uid=99");
}

#[tokio::test]
async fn test_update_missing_user() {
    let users = repository().await;

    let err = users
        .set_registration("missing", RegistrationKind::Face, true, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(users.set_zkteco_uid("missing", Some(uid(1))).await.unwrap_err().is_not_found());
    assert!(users.delete("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_assign_uid_and_delete() {
    let users = repository().await;
    let user = users.create(&NewUser::new("Ana", "ana@example.com")).await.unwrap();

    users.set_zkteco_uid(&user.id, Some(uid(3))).await.unwrap();

    let stored = users.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.zkteco_uid, Some(3));
    assert_eq!(stored.terminal_uid(), Some(uid(3)));
    assert_eq!(users.find_by_zkteco_uid(uid(3)).await.unwrap().unwrap().id, user.id);

    users.delete(&user.id).await.unwrap();
    assert!(users.find_by_id(&user.id).await.unwrap().is_none());
    assert!(users.find_by_zkteco_uid(uid(3)).await.unwrap().is_none());
}
