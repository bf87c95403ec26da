//! User operations: registration, credential checks, role membership.

use armature_core::error::AppError;
use serde_json::json;
use validator::Validate;

use crate::context::RequestContext;
use crate::crud::Crud;
use crate::entity::{Entity, ID, Row, from_row};
use crate::models::{User, UserCreate, UserPasswordChange, UserRole, UserRoleCreate};
use crate::query::{JoinKind, SortDir};
use crate::security::{hash_password, verify_password};

pub struct UserCrud;

impl UserCrud {
    /// Register a user. The clear-text password is hashed before storage
    /// and never written anywhere else; a taken email is a conflict.
    pub async fn create(ctx: &mut RequestContext, payload: &UserCreate) -> Result<User, AppError> {
        payload.validate()?;
        if Self::get_by_email(ctx, &payload.email).await?.is_some() {
            return Err(AppError::DuplicatedEntity(anyhow::anyhow!(
                "email {} is already registered",
                payload.email
            )));
        }
        let mut row = Row::new();
        row.insert("name".to_string(), json!(payload.name));
        row.insert("surname".to_string(), json!(payload.surname));
        row.insert("email".to_string(), json!(payload.email));
        row.insert(
            "hashed_password".to_string(),
            json!(hash_password(&payload.password)?),
        );
        row.insert("is_active".to_string(), json!(payload.is_active));
        let stored = ctx.transaction()?.insert(User::TABLE, row).await?;
        from_row(stored)
    }

    pub async fn get_by_email(
        ctx: &mut RequestContext,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        Crud::<User>::find(ctx, "email", json!(email)).await
    }

    pub async fn get_by_name(
        ctx: &mut RequestContext,
        name: &str,
        surname: &str,
    ) -> Result<Option<User>, AppError> {
        let query = Crud::<User>::query()
            .filter_eq("name", json!(name))
            .filter_eq("surname", json!(surname))
            .limit(1);
        Ok(Crud::<User>::select(ctx, query).await?.pop())
    }

    /// Check credentials. Unknown email and wrong password collapse into
    /// the same error so callers cannot probe for registered addresses.
    pub async fn authenticate(
        ctx: &mut RequestContext,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let user = Self::get_by_email(ctx, email)
            .await?
            .ok_or(AppError::IncorrectCredentials)?;
        if !verify_password(password, &user.hashed_password)? {
            return Err(AppError::IncorrectCredentials);
        }
        Ok(user)
    }

    pub fn ensure_active(user: &User) -> Result<(), AppError> {
        if user.is_active {
            Ok(())
        } else {
            Err(AppError::InactiveUser)
        }
    }

    /// Rotate the password after proving knowledge of the current one.
    pub async fn change_password(
        ctx: &mut RequestContext,
        user_id: i64,
        payload: &UserPasswordChange,
    ) -> Result<User, AppError> {
        payload.validate()?;
        let user = Crud::<User>::get(ctx, user_id).await?;
        if !verify_password(&payload.old_password, &user.hashed_password)? {
            return Err(AppError::IncorrectCredentials);
        }
        Self::set_password(ctx, user_id, &payload.new_password).await
    }

    /// Administrative reset: no proof of the old password required.
    pub async fn reset_password(
        ctx: &mut RequestContext,
        user_id: i64,
        new_password: &str,
    ) -> Result<User, AppError> {
        Self::set_password(ctx, user_id, new_password).await
    }

    async fn set_password(
        ctx: &mut RequestContext,
        user_id: i64,
        password: &str,
    ) -> Result<User, AppError> {
        let mut changes = Row::new();
        changes.insert(
            "hashed_password".to_string(),
            json!(hash_password(password)?),
        );
        Crud::<User>::update_with(ctx, user_id, changes).await
    }

    /// Grant a role. Granting an already-held role returns the existing
    /// association unchanged.
    pub async fn assign_role(
        ctx: &mut RequestContext,
        user_id: i64,
        role_id: i64,
    ) -> Result<UserRole, AppError> {
        Crud::<User>::get(ctx, user_id).await?;
        let payload = UserRoleCreate { user_id, role_id };
        Crud::<UserRole>::create_if_not_exist(
            ctx,
            &payload,
            &[("user_id", json!(user_id)), ("role_id", json!(role_id))],
            false,
        )
        .await
    }

    /// Revoke a role by soft-deleting the association. Revoking a role the
    /// user does not hold is a no-op.
    pub async fn remove_role(
        ctx: &mut RequestContext,
        user_id: i64,
        role_id: i64,
    ) -> Result<(), AppError> {
        let query = Crud::<UserRole>::query()
            .filter_eq("user_id", json!(user_id))
            .filter_eq("role_id", json!(role_id))
            .limit(1);
        if let Some(association) = Crud::<UserRole>::select(ctx, query).await?.pop() {
            Crud::<UserRole>::delete(ctx, association.id).await?;
        }
        Ok(())
    }

    /// Users currently holding a role. Revoked associations do not count.
    pub async fn users_in_role(
        ctx: &mut RequestContext,
        role_id: i64,
    ) -> Result<Vec<User>, AppError> {
        let query = Crud::<User>::query()
            .distinct()
            .join::<UserRole>(JoinKind::Inner, "users.id", "users_roles.user_id")
            .filter_eq("users_roles.role_id", json!(role_id))
            .sort_by(ID, SortDir::Asc);
        Crud::<User>::select(ctx, query).await
    }
}
