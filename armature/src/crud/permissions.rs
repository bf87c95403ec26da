//! Permission operations: grants to roles and retirement.

use armature_core::error::AppError;
use serde_json::json;

use crate::context::RequestContext;
use crate::crud::Crud;
use crate::models::{Permission, PermissionCreate, RolePermission, RolePermissionCreate};

pub struct PermissionCrud;

impl PermissionCrud {
    /// Create a permission with a unique name.
    pub async fn create(
        ctx: &mut RequestContext,
        payload: &PermissionCreate,
    ) -> Result<Permission, AppError> {
        Crud::<Permission>::create_if_not_exist(
            ctx,
            payload,
            &[("name", json!(payload.name))],
            true,
        )
        .await
    }

    pub async fn get_by_name(
        ctx: &mut RequestContext,
        name: &str,
    ) -> Result<Option<Permission>, AppError> {
        Crud::<Permission>::find(ctx, "name", json!(name)).await
    }

    /// Grant a permission to a role. Granting twice returns the existing
    /// association unchanged.
    pub async fn associate(
        ctx: &mut RequestContext,
        role_id: i64,
        permission_id: i64,
    ) -> Result<RolePermission, AppError> {
        Crud::<Permission>::get(ctx, permission_id).await?;
        let payload = RolePermissionCreate {
            role_id,
            permission_id,
        };
        Crud::<RolePermission>::create_if_not_exist(
            ctx,
            &payload,
            &[
                ("role_id", json!(role_id)),
                ("permission_id", json!(permission_id)),
            ],
            false,
        )
        .await
    }

    /// Withdraw a grant by physically removing the association, revoked or
    /// not. Absent grants are a no-op.
    pub async fn purge_association(
        ctx: &mut RequestContext,
        role_id: i64,
        permission_id: i64,
    ) -> Result<(), AppError> {
        let query = Crud::<RolePermission>::query()
            .ignore_soft_delete()
            .filter_eq("role_id", json!(role_id))
            .filter_eq("permission_id", json!(permission_id))
            .limit(1);
        if let Some(grant) = Crud::<RolePermission>::select(ctx, query).await?.pop() {
            Crud::<RolePermission>::purge(ctx, grant.id).await?;
        }
        Ok(())
    }

    /// Retire a permission: remove every role grant but keep the permission
    /// row as a historical artifact.
    pub async fn deprecate(ctx: &mut RequestContext, permission_id: i64) -> Result<(), AppError> {
        Crud::<Permission>::get(ctx, permission_id).await?;
        let grants = Crud::<RolePermission>::select(
            ctx,
            Crud::<RolePermission>::query()
                .ignore_soft_delete()
                .filter_eq("permission_id", json!(permission_id)),
        )
        .await?;
        for grant in grants {
            Crud::<RolePermission>::purge(ctx, grant.id).await?;
        }
        Ok(())
    }
}
