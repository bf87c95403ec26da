//! Transaction scope semantics through the request context.

mod common;

use armature::context::{Identity, Outcome, RequestContext};
use armature::crud::Crud;
use armature::crud::roles::RoleCrud;
use armature::models::Role;
use armature::store::MemoryStore;
use armature_core::error::AppError;
use common::*;

#[tokio::test]
async fn writes_are_visible_inside_the_scope_before_commit() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;

    let role = seed_role(&mut ctx, "editor").await;
    let found = RoleCrud::get_by_name(&mut ctx, "editor").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(role.id));

    // Not yet published to other contexts.
    let (mut other, other_scope) = open(&store, None).await;
    assert!(
        RoleCrud::get_by_name(&mut other, "editor")
            .await
            .unwrap()
            .is_none()
    );
    rollback(other, other_scope).await;

    commit(ctx, scope).await;
    let (mut after, after_scope) = open(&store, None).await;
    assert!(
        RoleCrud::get_by_name(&mut after, "editor")
            .await
            .unwrap()
            .is_some()
    );
    rollback(after, after_scope).await;
}

#[tokio::test]
async fn rollback_discards_every_write_in_the_scope() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    seed_role(&mut ctx, "editor").await;
    seed_role(&mut ctx, "reviewer").await;
    rollback(ctx, scope).await;

    assert_eq!(count_rows::<Role>(&store).await, 0);
}

#[tokio::test]
async fn nested_scopes_share_the_transaction_and_defer_finalization() {
    let store = MemoryStore::new();
    let mut ctx = RequestContext::new(true);
    let outer = ctx.begin(&store, None).await.unwrap();
    seed_role(&mut ctx, "editor").await;

    // The nested scope sees the outer scope's uncommitted write, and its
    // commit publishes nothing on its own.
    let inner = ctx.begin(&store, Some(Identity::new(42))).await.unwrap();
    assert!(
        RoleCrud::get_by_name(&mut ctx, "editor")
            .await
            .unwrap()
            .is_some()
    );
    seed_role(&mut ctx, "reviewer").await;
    ctx.end(inner, Outcome::Commit).await.unwrap();
    assert_eq!(count_rows::<Role>(&store).await, 0);

    // Rolling back the owning scope discards the nested scope's write too.
    ctx.end(outer, Outcome::Rollback).await.unwrap();
    assert_eq!(count_rows::<Role>(&store).await, 0);
}

#[tokio::test]
async fn nested_writes_are_stamped_with_the_nested_identity() {
    let store = MemoryStore::new();
    let (mut ctx, scope) = open(&store, None).await;
    let actor = seed_user(&mut ctx, "ada@example.com").await;

    let inner = ctx
        .begin(&store, Some(Identity::new(actor.id)))
        .await
        .unwrap();
    let stamped = seed_role(&mut ctx, "editor").await;
    assert_eq!(stamped.creator_user_id, Some(actor.id));
    ctx.end(inner, Outcome::Commit).await.unwrap();

    // Back outside the nested scope the context is anonymous again.
    let unstamped = seed_role(&mut ctx, "reviewer").await;
    assert_eq!(unstamped.creator_user_id, None);
    commit(ctx, scope).await;
}

#[tokio::test]
async fn operations_without_a_scope_fail_fast() {
    let store = MemoryStore::new();
    let mut ctx = RequestContext::new(true);
    let err = Crud::<Role>::get_all(&mut ctx).await;
    assert!(matches!(err, Err(AppError::NoActiveContext)));

    // Also after a completed request.
    let scope = ctx.begin(&store, None).await.unwrap();
    ctx.end(scope, Outcome::Commit).await.unwrap();
    let err = Crud::<Role>::get_all(&mut ctx).await;
    assert!(matches!(err, Err(AppError::NoActiveContext)));
}
