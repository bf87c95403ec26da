//! User registration, credential checks, and role membership.

mod common;

use armature::crud::Crud;
use armature::crud::users::UserCrud;
use armature::models::{User, UserPasswordChange, UserUpdate};
use armature::store::MemoryStore;
use armature_core::error::AppError;
use common::*;

#[tokio::test]
async fn registration_hashes_the_password_and_authenticates() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;
    assert_ne!(user.hashed_password, "analytical-engine");

    let authenticated = UserCrud::authenticate(&mut ctx, "ada@example.com", "analytical-engine")
        .await
        .unwrap();
    assert_eq!(authenticated.id, user.id);
    commit(ctx, scope).await;
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_identically() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    seed_user(&mut ctx, "ada@example.com").await;

    let wrong = UserCrud::authenticate(&mut ctx, "ada@example.com", "difference-engine").await;
    assert!(matches!(wrong, Err(AppError::IncorrectCredentials)));

    let unknown = UserCrud::authenticate(&mut ctx, "ghost@example.com", "anything-at-all").await;
    assert!(matches!(unknown, Err(AppError::IncorrectCredentials)));
    commit(ctx, scope).await;
}

#[tokio::test]
async fn deactivated_accounts_are_refused() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;

    let user = Crud::<User>::update(
        &mut ctx,
        user.id,
        &UserUpdate {
            is_active: Some(false),
            ..UserUpdate::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        UserCrud::ensure_active(&user),
        Err(AppError::InactiveUser)
    ));
    commit(ctx, scope).await;
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    seed_user(&mut ctx, "ada@example.com").await;

    let err = UserCrud::create(&mut ctx, &user_payload("ada@example.com")).await;
    assert!(matches!(err, Err(AppError::DuplicatedEntity(_))));
    commit(ctx, scope).await;
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;

    let err = UserCrud::change_password(
        &mut ctx,
        user.id,
        &UserPasswordChange {
            old_password: "difference-engine".to_string(),
            new_password: "jacquard-loom-cards".to_string(),
        },
    )
    .await;
    assert!(matches!(err, Err(AppError::IncorrectCredentials)));

    UserCrud::change_password(
        &mut ctx,
        user.id,
        &UserPasswordChange {
            old_password: "analytical-engine".to_string(),
            new_password: "jacquard-loom-cards".to_string(),
        },
    )
    .await
    .unwrap();

    UserCrud::authenticate(&mut ctx, "ada@example.com", "jacquard-loom-cards")
        .await
        .unwrap();
    commit(ctx, scope).await;
}

#[tokio::test]
async fn reset_password_needs_no_proof() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;

    UserCrud::reset_password(&mut ctx, user.id, "a-fresh-start")
        .await
        .unwrap();
    UserCrud::authenticate(&mut ctx, "ada@example.com", "a-fresh-start")
        .await
        .unwrap();
    commit(ctx, scope).await;
}

#[tokio::test]
async fn role_assignment_is_idempotent() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;
    let role = seed_role(&mut ctx, "editor").await;

    let first = UserCrud::assign_role(&mut ctx, user.id, role.id)
        .await
        .unwrap();
    let second = UserCrud::assign_role(&mut ctx, user.id, role.id)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let members = UserCrud::users_in_role(&mut ctx, role.id).await.unwrap();
    assert_eq!(members.len(), 1);
    commit(ctx, scope).await;
}

#[tokio::test]
async fn removing_an_unheld_role_is_a_no_op() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;
    let role = seed_role(&mut ctx, "editor").await;

    UserCrud::remove_role(&mut ctx, user.id, role.id)
        .await
        .unwrap();

    UserCrud::assign_role(&mut ctx, user.id, role.id)
        .await
        .unwrap();
    UserCrud::remove_role(&mut ctx, user.id, role.id)
        .await
        .unwrap();
    assert!(
        UserCrud::users_in_role(&mut ctx, role.id)
            .await
            .unwrap()
            .is_empty()
    );
    commit(ctx, scope).await;
}

#[tokio::test]
async fn lookup_by_name_and_email() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let user = seed_user(&mut ctx, "ada@example.com").await;

    let by_email = UserCrud::get_by_email(&mut ctx, "ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, user.id);

    let by_name = UserCrud::get_by_name(&mut ctx, "Ada", "Lovelace")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, user.id);

    assert!(
        UserCrud::get_by_name(&mut ctx, "Charles", "Babbage")
            .await
            .unwrap()
            .is_none()
    );
    commit(ctx, scope).await;
}
