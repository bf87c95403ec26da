//! PostgreSQL store backed by sqlx.
//!
//! Rows cross the seam as jsonb: selects return `to_jsonb(table.*)`, writes
//! go through `jsonb_populate_record` so one code path serves every entity
//! table without per-table SQL.

use armature_core::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::QueryScalar;
use sqlx::types::Json;

use crate::entity::{ID, Row};
use crate::query::SelectQuery;
use crate::store::{Store, StoreTx};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Row>, AppError> {
        let (sql, params) = query.to_sql()?;
        let mut q = sqlx::query_scalar::<_, Value>(&sql);
        for param in params {
            q = bind_value(q, param);
        }
        let values = q.fetch_all(&mut *self.tx).await?;
        values.into_iter().map(into_row).collect()
    }

    async fn count(&mut self, query: &SelectQuery) -> Result<i64, AppError> {
        let (sql, params) = query.to_count_sql()?;
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for param in params {
            q = bind_value(q, param);
        }
        Ok(q.fetch_one(&mut *self.tx).await?)
    }

    async fn insert(&mut self, table: &str, row: Row) -> Result<Row, AppError> {
        let table_ident = crate::query::quote_ident(table)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut sources = Vec::with_capacity(row.len());
        for column in row.keys() {
            columns.push(crate::query::quote_ident(column)?);
            sources.push(format!("r.{}", crate::query::quote_ident(column)?));
        }
        let sql = format!(
            "INSERT INTO {table_ident} ({}) SELECT {} FROM jsonb_populate_record(NULL::{table_ident}, $1) AS r RETURNING to_jsonb({table_ident}.*)",
            columns.join(", "),
            sources.join(", "),
        );
        let value = sqlx::query_scalar::<_, Value>(&sql)
            .bind(Json(Value::Object(row)))
            .fetch_one(&mut *self.tx)
            .await?;
        into_row(value)
    }

    async fn update(&mut self, table: &str, id: i64, changes: Row) -> Result<Row, AppError> {
        let table_ident = crate::query::quote_ident(table)?;
        let mut assignments = Vec::with_capacity(changes.len());
        for column in changes.keys() {
            let column = crate::query::quote_ident(column)?;
            assignments.push(format!("{column} = r.{column}"));
        }
        let sql = format!(
            "UPDATE {table_ident} SET {} FROM jsonb_populate_record(NULL::{table_ident}, $2) AS r WHERE {table_ident}.{} = $1 RETURNING to_jsonb({table_ident}.*)",
            assignments.join(", "),
            crate::query::quote_ident(ID)?,
        );
        let value = sqlx::query_scalar::<_, Value>(&sql)
            .bind(id)
            .bind(Json(Value::Object(changes)))
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "entity [{table}] with id={id} does not exist"
                ))
            })?;
        into_row(value)
    }

    async fn delete(&mut self, table: &str, id: i64) -> Result<(), AppError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            crate::query::quote_ident(table)?,
            crate::query::quote_ident(ID)?,
        );
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "entity [{table}] with id={id} does not exist"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn into_row(value: Value) -> Result<Row, AppError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(AppError::InternalError(anyhow::anyhow!(
            "expected jsonb object row, got {other}"
        ))),
    }
}

fn bind_value<O>(
    q: QueryScalar<'_, sqlx::Postgres, O, PgArguments>,
    value: Value,
) -> QueryScalar<'_, sqlx::Postgres, O, PgArguments> {
    match value {
        Value::Null => q.bind(Option::<String>::None),
        Value::Bool(b) => q.bind(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else {
                q.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => q.bind(s),
        other => q.bind(Json(other)),
    }
}
