//! Role operations: lifecycle and membership queries.

use armature_core::error::AppError;
use serde_json::json;

use crate::context::RequestContext;
use crate::crud::Crud;
use crate::entity::ID;
use crate::models::{Role, RoleCreate, RolePermission, User, UserRole};
use crate::query::SortDir;

pub struct RoleCrud;

impl RoleCrud {
    /// Create a role with a unique name among visible roles. A deprecated
    /// role does not block reuse of its name.
    pub async fn create(ctx: &mut RequestContext, payload: &RoleCreate) -> Result<Role, AppError> {
        Crud::<Role>::create_if_not_exist(ctx, payload, &[("name", json!(payload.name))], true)
            .await
    }

    pub async fn get_by_name(
        ctx: &mut RequestContext,
        name: &str,
    ) -> Result<Option<Role>, AppError> {
        Crud::<Role>::find(ctx, "name", json!(name)).await
    }

    /// Users who do not currently hold the role; candidates for assignment.
    pub async fn users_not_in_role(
        ctx: &mut RequestContext,
        role_id: i64,
    ) -> Result<Vec<User>, AppError> {
        let members = Crud::<UserRole>::select(
            ctx,
            Crud::<UserRole>::query().filter_eq("role_id", json!(role_id)),
        )
        .await?;
        let member_ids = members
            .into_iter()
            .map(|association| json!(association.user_id))
            .collect();
        let query = Crud::<User>::query()
            .filter_not_in(ID, member_ids)
            .sort_by(ID, SortDir::Asc);
        Crud::<User>::select(ctx, query).await
    }

    /// Retire a role: purge every user and permission association, then
    /// soft-delete the role itself. Holders lose its permissions at once;
    /// the role row stays for historical reads.
    pub async fn deprecate(ctx: &mut RequestContext, role_id: i64) -> Result<(), AppError> {
        let role = Crud::<Role>::get(ctx, role_id).await?;

        let memberships = Crud::<UserRole>::select(
            ctx,
            Crud::<UserRole>::query()
                .ignore_soft_delete()
                .filter_eq("role_id", json!(role_id)),
        )
        .await?;
        for membership in memberships {
            Crud::<UserRole>::purge(ctx, membership.id).await?;
        }

        let grants = Crud::<RolePermission>::select(
            ctx,
            Crud::<RolePermission>::query()
                .ignore_soft_delete()
                .filter_eq("role_id", json!(role_id)),
        )
        .await?;
        for grant in grants {
            Crud::<RolePermission>::purge(ctx, grant.id).await?;
        }

        Crud::<Role>::delete(ctx, role.id).await?;
        Ok(())
    }
}
