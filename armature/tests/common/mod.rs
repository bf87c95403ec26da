#![allow(dead_code)]

use armature::context::{Identity, Outcome, RequestContext, ScopeHandle};
use armature::crud::Crud;
use armature::crud::permissions::PermissionCrud;
use armature::crud::roles::RoleCrud;
use armature::crud::users::UserCrud;
use armature::models::{Permission, PermissionCreate, Role, RoleCreate, User, UserCreate};
use armature::store::MemoryStore;
use armature_core::error::AppError;
use futures::future::BoxFuture;

pub fn user_payload(email: &str) -> UserCreate {
    UserCreate {
        name: "Ada".to_string(),
        surname: "Lovelace".to_string(),
        email: email.to_string(),
        password: "analytical-engine".to_string(),
        is_active: true,
    }
}

pub fn role_payload(name: &str) -> RoleCreate {
    RoleCreate {
        name: name.to_string(),
        is_active: true,
    }
}

/// Open a request scope on a fresh context, acting as `identity`.
pub async fn open(
    store: &MemoryStore,
    identity: Option<Identity>,
) -> (RequestContext, ScopeHandle) {
    let mut ctx = RequestContext::new(true);
    let scope = ctx.begin(store, identity).await.expect("begin scope");
    (ctx, scope)
}

pub async fn commit(mut ctx: RequestContext, scope: ScopeHandle) {
    ctx.end(scope, Outcome::Commit).await.expect("commit scope");
}

pub async fn rollback(mut ctx: RequestContext, scope: ScopeHandle) {
    ctx.end(scope, Outcome::Rollback)
        .await
        .expect("rollback scope");
}

pub async fn seed_user(ctx: &mut RequestContext, email: &str) -> User {
    UserCrud::create(ctx, &user_payload(email))
        .await
        .expect("seed user")
}

pub async fn seed_role(ctx: &mut RequestContext, name: &str) -> Role {
    RoleCrud::create(ctx, &role_payload(name))
        .await
        .expect("seed role")
}

pub async fn seed_permission(ctx: &mut RequestContext, name: &str) -> Permission {
    PermissionCrud::create(
        ctx,
        &PermissionCreate {
            name: name.to_string(),
        },
    )
    .await
    .expect("seed permission")
}

/// Seed a user holding `role` with all of `permissions`, committed.
pub async fn seed_grant_chain(
    store: &MemoryStore,
    email: &str,
    role: &str,
    permissions: &[&str],
) -> (User, Role) {
    let (mut ctx, scope) = open(store, None).await;
    let user = seed_user(&mut ctx, email).await;
    let role = seed_role(&mut ctx, role).await;
    UserCrud::assign_role(&mut ctx, user.id, role.id)
        .await
        .expect("assign role");
    for name in permissions {
        let permission = seed_permission(&mut ctx, name).await;
        PermissionCrud::associate(&mut ctx, role.id, permission.id)
            .await
            .expect("grant permission");
    }
    commit(ctx, scope).await;
    (user, role)
}

pub async fn count_rows<E: armature::entity::Entity>(store: &MemoryStore) -> i64 {
    let (mut ctx, scope) = open(store, None).await;
    let total = Crud::<E>::count(&mut ctx, Crud::<E>::query().ignore_soft_delete())
        .await
        .expect("count");
    rollback(ctx, scope).await;
    total
}

/// Coerce a closure into the dispatcher's handler shape.
pub fn handler<T, F>(f: F) -> F
where
    F: for<'a> FnOnce(&'a mut RequestContext) -> BoxFuture<'a, Result<T, AppError>>,
{
    f
}
