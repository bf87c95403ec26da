//! Permission evaluation over the user-role-permission graph.
//!
//! A user holds a permission when an unrevoked role membership chains to an
//! unrevoked permission grant. Checks are conjunctive: every requested name
//! must be held. The empty request is vacuously satisfied.

use std::collections::BTreeSet;

use armature_core::error::AppError;
use serde_json::json;

use crate::context::RequestContext;
use crate::crud::Crud;
use crate::entity::ID;
use crate::models::{Permission, Role, RolePermission, UserRole};
use crate::query::{JoinKind, SortDir};

/// Whether the user holds every named permission. Unknown names are simply
/// not held, so they fail the check rather than erroring.
pub async fn has_permissions(
    ctx: &mut RequestContext,
    user_id: i64,
    names: &[&str],
) -> Result<bool, AppError> {
    // Requested names are a set: duplicates in the slice count once.
    let names: BTreeSet<&str> = names.iter().copied().collect();
    if names.is_empty() {
        return Ok(true);
    }
    let values = names.iter().map(|n| json!(n)).collect();
    let query = Crud::<Permission>::query()
        .distinct()
        .join::<RolePermission>(
            JoinKind::Inner,
            "permissions.id",
            "roles_permissions.permission_id",
        )
        .join::<Role>(JoinKind::Inner, "roles_permissions.role_id", "roles.id")
        .join::<UserRole>(JoinKind::Inner, "roles.id", "users_roles.role_id")
        .filter_eq("users_roles.user_id", json!(user_id))
        .filter_in("permissions.name", values);
    let held = Crud::<Permission>::count(ctx, query).await?;
    Ok(held == names.len() as i64)
}

/// Whether the user holds every named role.
pub async fn has_roles(
    ctx: &mut RequestContext,
    user_id: i64,
    names: &[&str],
) -> Result<bool, AppError> {
    let names: BTreeSet<&str> = names.iter().copied().collect();
    if names.is_empty() {
        return Ok(true);
    }
    let values = names.iter().map(|n| json!(n)).collect();
    let query = Crud::<Role>::query()
        .distinct()
        .join::<UserRole>(JoinKind::Inner, "roles.id", "users_roles.role_id")
        .filter_eq("users_roles.user_id", json!(user_id))
        .filter_in("roles.name", values);
    let held = Crud::<Role>::count(ctx, query).await?;
    Ok(held == names.len() as i64)
}

/// Guard form of `has_permissions` over the context's current identity:
/// a missing permission, or no identity at all, is `Forbidden`.
pub async fn require_permissions(
    ctx: &mut RequestContext,
    names: &[&str],
) -> Result<(), AppError> {
    let user_id = match ctx.identity()? {
        Some(identity) => identity.user_id,
        None => {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "authentication required for: {}",
                names.join(", ")
            )));
        }
    };
    if has_permissions(ctx, user_id, names).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "user {user_id} lacks required permissions: {}",
            names.join(", ")
        )))
    }
}

/// All permissions the user currently holds, ordered by name.
pub async fn permissions_for(
    ctx: &mut RequestContext,
    user_id: i64,
) -> Result<Vec<Permission>, AppError> {
    let query = Crud::<Permission>::query()
        .distinct()
        .join::<RolePermission>(
            JoinKind::Inner,
            "permissions.id",
            "roles_permissions.permission_id",
        )
        .join::<Role>(JoinKind::Inner, "roles_permissions.role_id", "roles.id")
        .join::<UserRole>(JoinKind::Inner, "roles.id", "users_roles.role_id")
        .filter_eq("users_roles.user_id", json!(user_id))
        .sort_by("name", SortDir::Asc);
    Crud::<Permission>::select(ctx, query).await
}

/// All roles the user currently holds, ordered by id.
pub async fn roles_for(ctx: &mut RequestContext, user_id: i64) -> Result<Vec<Role>, AppError> {
    let query = Crud::<Role>::query()
        .distinct()
        .join::<UserRole>(JoinKind::Inner, "roles.id", "users_roles.role_id")
        .filter_eq("users_roles.user_id", json!(user_id))
        .sort_by(ID, SortDir::Asc);
    Crud::<Role>::select(ctx, query).await
}
