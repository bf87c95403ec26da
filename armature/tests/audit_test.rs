//! Dispatcher semantics: identity resolution, audit on success, and the
//! all-or-nothing fate of a request's writes.

mod common;

use std::sync::Arc;

use armature::audit;
use armature::context::Identity;
use armature::crud::roles::RoleCrud;
use armature::dispatch::{Dispatcher, RequestMeta};
use armature::models::{AuditEntry, Role};
use armature::security::TokenCodec;
use armature::store::MemoryStore;
use armature_core::error::AppError;
use common::*;
use futures::FutureExt;

const SECRET: &str = "integration-test-secret";

fn dispatcher(store: &MemoryStore) -> Dispatcher {
    Dispatcher::new(
        Arc::new(store.clone()),
        TokenCodec::new(SECRET, 60),
        true,
    )
}

fn meta(token: Option<String>) -> RequestMeta {
    RequestMeta {
        client_host: "127.0.0.1".to_string(),
        method: "POST".to_string(),
        url: "/roles".to_string(),
        headers: "accept: application/json".to_string(),
        body: Some(r#"{"name":"editor"}"#.to_string()),
        token,
        ..RequestMeta::default()
    }
}

async fn audits(store: &MemoryStore) -> Vec<AuditEntry> {
    let (mut ctx, scope) = open(store, None).await;
    let entries = audit::recent(&mut ctx, 10).await.unwrap();
    rollback(ctx, scope).await;
    entries
}

#[tokio::test]
async fn successful_requests_commit_and_leave_one_audit_entry() {
    let store = MemoryStore::new();
    let (user, _) = seed_grant_chain(&store, "ada@example.com", "staff", &[]).await;
    let dispatcher = dispatcher(&store);
    let token = dispatcher.tokens().issue(&Identity::new(user.id)).unwrap();

    let role_id = dispatcher
        .handle(
            meta(Some(token)),
            handler(|ctx| {
                async move {
                    let role = RoleCrud::create(ctx, &role_payload("editor")).await?;
                    Ok(role.id)
                }
                .boxed()
            }),
        )
        .await
        .unwrap();

    let (mut ctx, scope) = open(&store, None).await;
    let role = RoleCrud::get_by_name(&mut ctx, "editor").await.unwrap();
    assert_eq!(role.map(|r| r.id), Some(role_id));
    rollback(ctx, scope).await;

    let entries = audits(&store).await;
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.user_id, Some(user.id));
    assert_eq!(entry.impersonator_user_id, None);
    assert_eq!(entry.status_code, Some(200));
    assert_eq!(entry.method, "POST");
    assert_eq!(entry.url, "/roles");
    assert!(entry.process_time_ms.is_some());
    assert!(entry.request_id.is_some());
}

#[tokio::test]
async fn failed_requests_leave_no_trace() {
    let store = MemoryStore::new();
    let (user, _) = seed_grant_chain(&store, "ada@example.com", "staff", &[]).await;
    let dispatcher = dispatcher(&store);
    let token = dispatcher.tokens().issue(&Identity::new(user.id)).unwrap();

    let result: Result<(), _> = dispatcher
        .handle(
            meta(Some(token)),
            handler(|ctx| {
                async move {
                    // A write that must not survive the failure below.
                    RoleCrud::create(ctx, &role_payload("editor")).await?;
                    Err(AppError::Forbidden(anyhow::anyhow!("denied")))
                }
                .boxed()
            }),
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let (mut ctx, scope) = open(&store, None).await;
    assert!(
        RoleCrud::get_by_name(&mut ctx, "editor")
            .await
            .unwrap()
            .is_none()
    );
    rollback(ctx, scope).await;
    assert!(audits(&store).await.is_empty());
    assert_eq!(count_rows::<Role>(&store).await, 1); // only the seeded "staff"
}

#[tokio::test]
async fn audit_records_the_status_the_transport_will_send() {
    let store = MemoryStore::new();
    let dispatcher = dispatcher(&store);

    let mut created = meta(None);
    created.success_status = Some(201);
    dispatcher
        .handle(created, handler(|_ctx| async move { Ok(()) }.boxed()))
        .await
        .unwrap();

    let entries = audits(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status_code, Some(201));
}

#[tokio::test]
async fn anonymous_requests_are_audited_without_an_actor() {
    let store = MemoryStore::new();
    let dispatcher = dispatcher(&store);

    dispatcher
        .handle(meta(None), handler(|_ctx| async move { Ok(()) }.boxed()))
        .await
        .unwrap();

    let entries = audits(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, None);
    assert_eq!(entries[0].impersonator_user_id, None);
}

#[tokio::test]
async fn impersonation_records_both_actors() {
    let store = MemoryStore::new();
    let (admin, _) = seed_grant_chain(&store, "admin@example.com", "admins", &[]).await;
    let (subject, _) = seed_grant_chain(&store, "ada@example.com", "staff", &[]).await;
    let dispatcher = dispatcher(&store);
    let token = dispatcher
        .tokens()
        .issue(&Identity::impersonated(subject.id, admin.id))
        .unwrap();

    dispatcher
        .handle(
            meta(Some(token)),
            handler(|_ctx| async move { Ok(()) }.boxed()),
        )
        .await
        .unwrap();

    let entries = audits(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, Some(subject.id));
    assert_eq!(entries[0].impersonator_user_id, Some(admin.id));
}

#[tokio::test]
async fn garbage_tokens_are_rejected_before_any_work() {
    let store = MemoryStore::new();
    let dispatcher = dispatcher(&store);

    let result: Result<(), _> = dispatcher
        .handle(
            meta(Some("not-a-token".to_string())),
            handler(|_ctx| async move { panic!("handler must not run") }.boxed()),
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidToken(_))));
    assert!(audits(&store).await.is_empty());
}

#[tokio::test]
async fn tokens_for_deactivated_users_are_refused() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let mut payload = user_payload("ada@example.com");
    payload.is_active = false;
    let user = armature::crud::users::UserCrud::create(&mut ctx, &payload)
        .await
        .unwrap();
    commit(ctx, scope).await;

    let dispatcher = dispatcher(&store);
    let token = dispatcher.tokens().issue(&Identity::new(user.id)).unwrap();

    let result: Result<(), _> = dispatcher
        .handle(
            meta(Some(token)),
            handler(|_ctx| async move { panic!("handler must not run") }.boxed()),
        )
        .await;
    assert!(matches!(result, Err(AppError::InactiveUser)));
    assert!(audits(&store).await.is_empty());
}
