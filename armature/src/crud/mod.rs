//! Generic CRUD engine.
//!
//! `Crud<E>` implements create/read/update/delete for any `Entity`, branching
//! on the entity's declared capabilities: tracked entities get identity and
//! timestamp stamps, soft-deletable entities get flag-flip deletes, and
//! logged entities get before/after mutation log entries. Domain-specific
//! operations live in the per-entity modules below and compose these
//! primitives.

pub mod permissions;
pub mod roles;
pub mod users;

use std::marker::PhantomData;

use armature_core::error::AppError;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use validator::Validate;

use crate::context::RequestContext;
use crate::entity::{
    CREATED_UTC, CREATOR_USER_ID, DELETED, Entity, ID, MODIFIED_UTC, MODIFIER_USER_ID, Row,
    from_row, to_row,
};
use crate::models::LogEntry;
use crate::query::{SelectQuery, SortDir};

pub struct Crud<E: Entity> {
    _entity: PhantomData<E>,
}

impl<E: Entity> Crud<E> {
    /// A select over this entity's table, soft-delete predicate included
    /// when the entity declares the capability.
    pub fn query() -> SelectQuery {
        SelectQuery::for_entity::<E>()
    }

    /// Insert a validated payload and return the stored entity.
    pub async fn create<C>(ctx: &mut RequestContext, payload: &C) -> Result<E, AppError>
    where
        C: Serialize + Validate + Sync,
    {
        payload.validate()?;
        let mut row = to_row(payload)?;
        Self::stamp_create(ctx, &mut row)?;
        let stored = ctx.transaction()?.insert(E::TABLE, row).await?;
        Self::log_mutation(ctx, None, Some(&stored)).await?;
        from_row(stored)
    }

    /// Create unless a row already matches the given equality filters. With
    /// `raise_on_exists` a match becomes `DuplicatedEntity`; otherwise the
    /// existing entity is returned untouched.
    pub async fn create_if_not_exist<C>(
        ctx: &mut RequestContext,
        payload: &C,
        filters: &[(&str, Value)],
        raise_on_exists: bool,
    ) -> Result<E, AppError>
    where
        C: Serialize + Validate + Sync,
    {
        let mut query = Self::query().limit(1);
        for (field, value) in filters {
            query = query.filter_eq(field, value.clone());
        }
        let mut rows = ctx.transaction()?.select(&query).await?;
        match rows.pop() {
            Some(_) if raise_on_exists => Err(AppError::DuplicatedEntity(anyhow::anyhow!(
                "{} already exists",
                E::TABLE
            ))),
            Some(row) => from_row(row),
            None => Self::create(ctx, payload).await,
        }
    }

    /// Fetch by id or fail with `NotFound`.
    pub async fn get(ctx: &mut RequestContext, id: i64) -> Result<E, AppError> {
        match Self::get_if_exist(ctx, id).await? {
            Some(entity) => Ok(entity),
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "{} id {id} not found",
                E::TABLE
            ))),
        }
    }

    /// Fetch by id, `None` when absent or soft-deleted.
    pub async fn get_if_exist(ctx: &mut RequestContext, id: i64) -> Result<Option<E>, AppError> {
        let query = Self::query().filter_eq(ID, json!(id)).limit(1);
        let mut rows = ctx.transaction()?.select(&query).await?;
        rows.pop().map(from_row).transpose()
    }

    /// First entity matching an equality filter.
    pub async fn find(
        ctx: &mut RequestContext,
        field: &str,
        value: Value,
    ) -> Result<Option<E>, AppError> {
        let query = Self::query().filter_eq(field, value).limit(1);
        let mut rows = ctx.transaction()?.select(&query).await?;
        rows.pop().map(from_row).transpose()
    }

    /// All visible entities, ordered by id.
    pub async fn get_all(ctx: &mut RequestContext) -> Result<Vec<E>, AppError> {
        Self::select(ctx, Self::query().sort_by(ID, SortDir::Asc)).await
    }

    /// Paginated listing: total count of matching rows before pagination,
    /// plus the requested page.
    pub async fn get_multi(
        ctx: &mut RequestContext,
        query: SelectQuery,
    ) -> Result<(i64, Vec<E>), AppError> {
        let tx = ctx.transaction()?;
        let total = tx.count(&query).await?;
        let rows = tx.select(&query).await?;
        let entities = rows.into_iter().map(from_row).collect::<Result<_, _>>()?;
        Ok((total, entities))
    }

    /// Execute an arbitrary select built from `query()`.
    pub async fn select(
        ctx: &mut RequestContext,
        query: SelectQuery,
    ) -> Result<Vec<E>, AppError> {
        let rows = ctx.transaction()?.select(&query).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn count(ctx: &mut RequestContext, query: SelectQuery) -> Result<i64, AppError> {
        ctx.transaction()?.count(&query).await
    }

    /// Apply a validated partial update and return the stored entity.
    /// Payload fields serialized as absent are left untouched.
    pub async fn update<U>(ctx: &mut RequestContext, id: i64, payload: &U) -> Result<E, AppError>
    where
        U: Serialize + Validate + Sync,
    {
        payload.validate()?;
        Self::update_with(ctx, id, to_row(payload)?).await
    }

    /// Raw-row variant of `update` for engine-internal columns.
    pub async fn update_with(
        ctx: &mut RequestContext,
        id: i64,
        mut changes: Row,
    ) -> Result<E, AppError> {
        let before = Self::visible_row(ctx, id).await?;
        Self::stamp_update(ctx, &mut changes)?;
        let stored = ctx.transaction()?.update(E::TABLE, id, changes).await?;
        Self::log_mutation(ctx, Some(&before), Some(&stored)).await?;
        from_row(stored)
    }

    /// Delete an entity and return its pre-delete state. Soft-deletable
    /// entities have their flag flipped and remain in storage; everything
    /// else is removed physically.
    pub async fn delete(ctx: &mut RequestContext, id: i64) -> Result<E, AppError> {
        let before = Self::visible_row(ctx, id).await?;
        if E::SOFT_DELETE {
            let mut changes = Row::new();
            changes.insert(DELETED.to_string(), json!(true));
            Self::stamp_update(ctx, &mut changes)?;
            ctx.transaction()?.update(E::TABLE, id, changes).await?;
        } else {
            ctx.transaction()?.delete(E::TABLE, id).await?;
        }
        Self::log_mutation(ctx, Some(&before), None).await?;
        from_row(before)
    }

    /// Physically remove a row regardless of soft-delete capability, flagged
    /// rows included.
    pub async fn purge(ctx: &mut RequestContext, id: i64) -> Result<(), AppError> {
        let query = Self::query()
            .ignore_soft_delete()
            .filter_eq(ID, json!(id))
            .limit(1);
        let mut rows = ctx.transaction()?.select(&query).await?;
        let before = rows.pop().ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("{} id {id} not found", E::TABLE))
        })?;
        ctx.transaction()?.delete(E::TABLE, id).await?;
        Self::log_mutation(ctx, Some(&before), None).await
    }

    async fn visible_row(ctx: &mut RequestContext, id: i64) -> Result<Row, AppError> {
        let query = Self::query().filter_eq(ID, json!(id)).limit(1);
        let mut rows = ctx.transaction()?.select(&query).await?;
        rows.pop().ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("{} id {id} not found", E::TABLE))
        })
    }

    fn stamp_create(ctx: &RequestContext, row: &mut Row) -> Result<(), AppError> {
        if E::SOFT_DELETE {
            row.insert(DELETED.to_string(), json!(false));
        }
        if E::TRACKED {
            let user_id = ctx.identity()?.map(|identity| identity.user_id);
            row.insert(CREATOR_USER_ID.to_string(), json!(user_id));
            row.insert(CREATED_UTC.to_string(), json!(Utc::now()));
        }
        Ok(())
    }

    fn stamp_update(ctx: &RequestContext, changes: &mut Row) -> Result<(), AppError> {
        if E::TRACKED {
            let user_id = ctx.identity()?.map(|identity| identity.user_id);
            changes.insert(MODIFIER_USER_ID.to_string(), json!(user_id));
            changes.insert(MODIFIED_UTC.to_string(), json!(Utc::now()));
        }
        Ok(())
    }

    /// Record a before/after snapshot for logged entities. `before` is
    /// absent on create, `after` on delete.
    async fn log_mutation(
        ctx: &mut RequestContext,
        before: Option<&Row>,
        after: Option<&Row>,
    ) -> Result<(), AppError> {
        if !E::LOGGED || !ctx.mutation_log_enabled() {
            return Ok(());
        }
        let request_id = ctx.request_id().to_string();
        let mut row = Row::new();
        row.insert("request_id".to_string(), json!(request_id));
        row.insert("entity".to_string(), json!(E::TABLE));
        row.insert(
            "before".to_string(),
            before.map_or(Value::Null, |r| Value::Object(r.clone())),
        );
        row.insert(
            "after".to_string(),
            after.map_or(Value::Null, |r| Value::Object(r.clone())),
        );
        row.insert(CREATED_UTC.to_string(), json!(Utc::now()));
        ctx.transaction()?.insert(LogEntry::TABLE, row).await?;
        Ok(())
    }
}
