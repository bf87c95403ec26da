//! Soft-delete-aware select queries.
//!
//! `SelectQuery` centralizes the `deleted = false` predicate injection so no
//! call site has to remember it: base reads over soft-deletable entities get
//! the predicate at construction time, and joins against soft-deletable
//! targets get it added to the join condition (not the outer filter), so
//! left joins still emit their left-side rows. `ignore_soft_delete` removes
//! exactly the predicates this layer added, never any caller filter.
//!
//! Filters are equality/membership over declared fields only. The query
//! renders to parameterized PostgreSQL and is interpreted directly by the
//! in-memory store.

use armature_core::error::AppError;
use serde_json::Value;

use crate::entity::{DELETED, Entity, ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone)]
pub(crate) enum FilterOp {
    Eq(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
}

#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub field: String,
    pub op: FilterOp,
}

#[derive(Debug, Clone)]
pub(crate) struct Join {
    pub table: String,
    pub kind: JoinKind,
    /// Qualified column on the already-joined side, e.g. `roles.id`.
    pub left: String,
    /// Qualified column on the joined table, e.g. `users_roles.role_id`.
    pub right: String,
    /// Whether this layer injected `table.deleted = false` into the join
    /// condition. Cleared by `ignore_soft_delete`.
    pub filter_deleted: bool,
}

/// A select over one entity table, with optional joins used for filtering.
///
/// The projection is always the base table's columns.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub(crate) table: String,
    pub(crate) distinct: bool,
    /// Whether the base table carries the injected `deleted = false`
    /// predicate. Cleared by `ignore_soft_delete`.
    pub(crate) base_soft_delete: bool,
    pub(crate) filters: Vec<Filter>,
    pub(crate) joins: Vec<Join>,
    pub(crate) sort: Vec<(String, SortDir)>,
    pub(crate) offset: Option<i64>,
    pub(crate) limit: Option<i64>,
}

impl SelectQuery {
    /// Start a query over an entity table, injecting the soft-delete
    /// predicate when the entity declares the capability.
    pub fn for_entity<E: Entity>() -> Self {
        Self {
            table: E::TABLE.to_string(),
            distinct: false,
            base_soft_delete: E::SOFT_DELETE,
            filters: Vec::new(),
            joins: Vec::new(),
            sort: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Equality filter. Unqualified fields refer to the base table.
    pub fn filter_eq(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Eq(value),
        });
        self
    }

    /// Membership filter. An empty list matches nothing.
    pub fn filter_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::In(values),
        });
        self
    }

    /// Exclusion filter. An empty list matches everything.
    pub fn filter_not_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::NotIn(values),
        });
        self
    }

    /// Join another entity table for filtering. When the target is
    /// soft-deletable, `target.deleted = false` is added to the join
    /// condition so outer joins keep their left-side rows.
    pub fn join<J: Entity>(mut self, kind: JoinKind, left: &str, right: &str) -> Self {
        self.joins.push(Join {
            table: J::TABLE.to_string(),
            kind,
            left: left.to_string(),
            right: right.to_string(),
            filter_deleted: J::SOFT_DELETE,
        });
        self
    }

    /// Remove exactly the soft-delete predicates this layer injected.
    pub fn ignore_soft_delete(mut self) -> Self {
        self.base_soft_delete = false;
        for join in &mut self.joins {
            join.filter_deleted = false;
        }
        self
    }

    pub fn sort_by(mut self, field: &str, dir: SortDir) -> Self {
        self.sort.push((field.to_string(), dir));
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Qualify an unqualified field with the base table.
    pub(crate) fn qualify(&self, field: &str) -> String {
        if field.contains('.') {
            field.to_string()
        } else {
            format!("{}.{}", self.table, field)
        }
    }

    /// Render as parameterized PostgreSQL, returning the SQL and the bind
    /// values in placeholder order.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), AppError> {
        let base = quote_ident(&self.table)?;
        let mut sql = format!(
            "SELECT {}to_jsonb({}.*) FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            base,
            base
        );
        self.render_joins(&mut sql)?;

        let mut params = Vec::new();
        let where_clause = self.render_where(&mut params)?;
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }

        if !self.sort.is_empty() {
            let mut clauses = Vec::with_capacity(self.sort.len());
            for (field, dir) in &self.sort {
                let dir = match dir {
                    SortDir::Asc => "ASC",
                    SortDir::Desc => "DESC",
                };
                clauses.push(format!("{} {}", quote_path(&self.qualify(field))?, dir));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&clauses.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok((sql, params))
    }

    /// Render the matching count query (pre-pagination, ignoring sort).
    pub fn to_count_sql(&self) -> Result<(String, Vec<Value>), AppError> {
        let base = quote_ident(&self.table)?;
        let projection = if self.distinct {
            format!("COUNT(DISTINCT {}.{})", base, quote_ident(ID)?)
        } else {
            "COUNT(*)".to_string()
        };
        let mut sql = format!("SELECT {projection} FROM {base}");
        self.render_joins(&mut sql)?;

        let mut params = Vec::new();
        let where_clause = self.render_where(&mut params)?;
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        Ok((sql, params))
    }

    fn render_joins(&self, sql: &mut String) -> Result<(), AppError> {
        for join in &self.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push_str(&format!(
                " {} {} ON {} = {}",
                keyword,
                quote_ident(&join.table)?,
                quote_path(&join.left)?,
                quote_path(&join.right)?
            ));
            if join.filter_deleted {
                sql.push_str(&format!(
                    " AND {}.{} = FALSE",
                    quote_ident(&join.table)?,
                    quote_ident(DELETED)?
                ));
            }
        }
        Ok(())
    }

    fn render_where(&self, params: &mut Vec<Value>) -> Result<String, AppError> {
        let mut clauses = Vec::new();
        if self.base_soft_delete {
            clauses.push(format!(
                "{}.{} = FALSE",
                quote_ident(&self.table)?,
                quote_ident(DELETED)?
            ));
        }
        for filter in &self.filters {
            let column = quote_path(&self.qualify(&filter.field))?;
            match &filter.op {
                FilterOp::Eq(value) => {
                    params.push(value.clone());
                    clauses.push(format!("{} = ${}", column, params.len()));
                }
                FilterOp::In(values) => {
                    if values.is_empty() {
                        clauses.push("FALSE".to_string());
                        continue;
                    }
                    let mut placeholders = Vec::with_capacity(values.len());
                    for value in values {
                        params.push(value.clone());
                        placeholders.push(format!("${}", params.len()));
                    }
                    clauses.push(format!("{} IN ({})", column, placeholders.join(", ")));
                }
                FilterOp::NotIn(values) => {
                    if values.is_empty() {
                        continue;
                    }
                    let mut placeholders = Vec::with_capacity(values.len());
                    for value in values {
                        params.push(value.clone());
                        placeholders.push(format!("${}", params.len()));
                    }
                    clauses.push(format!("{} NOT IN ({})", column, placeholders.join(", ")));
                }
            }
        }
        Ok(clauses.join(" AND "))
    }
}

/// Quote a single SQL identifier, rejecting anything outside the declared
/// snake_case alphabet.
pub(crate) fn quote_ident(name: &str) -> Result<String, AppError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::InternalError(anyhow::anyhow!(
            "invalid identifier: {name:?}"
        )));
    }
    Ok(format!("\"{name}\""))
}

/// Quote a `table.column` path.
fn quote_path(path: &str) -> Result<String, AppError> {
    match path.split_once('.') {
        Some((table, column)) => Ok(format!("{}.{}", quote_ident(table)?, quote_ident(column)?)),
        None => quote_ident(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Permission, Role, User, UserRole};
    use serde_json::json;

    #[test]
    fn base_predicate_injected_for_soft_deletable_entity() {
        let (sql, params) = SelectQuery::for_entity::<Role>()
            .filter_eq("name", json!("editor"))
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT to_jsonb(\"roles\".*) FROM \"roles\" WHERE \"roles\".\"deleted\" = FALSE AND \"roles\".\"name\" = $1"
        );
        assert_eq!(params, vec![json!("editor")]);
    }

    #[test]
    fn no_predicate_for_plain_entity() {
        let (sql, _) = SelectQuery::for_entity::<User>().to_sql().unwrap();
        assert_eq!(sql, "SELECT to_jsonb(\"users\".*) FROM \"users\"");
    }

    #[test]
    fn join_predicate_lives_in_join_condition_not_outer_filter() {
        // Left-joining a soft-deletable table must keep the left rows even
        // when the only candidate pairing is a deleted row.
        let (sql, _) = SelectQuery::for_entity::<User>()
            .join::<UserRole>(JoinKind::Left, "users.id", "users_roles.user_id")
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT to_jsonb(\"users\".*) FROM \"users\" LEFT JOIN \"users_roles\" ON \"users\".\"id\" = \"users_roles\".\"user_id\" AND \"users_roles\".\"deleted\" = FALSE"
        );
    }

    #[test]
    fn ignore_soft_delete_removes_only_injected_predicates() {
        let (sql, params) = SelectQuery::for_entity::<Role>()
            .join::<UserRole>(JoinKind::Inner, "roles.id", "users_roles.role_id")
            .filter_eq("users_roles.user_id", json!(3))
            .ignore_soft_delete()
            .to_sql()
            .unwrap();
        assert!(!sql.contains("deleted"));
        assert!(sql.contains("\"users_roles\".\"user_id\" = $1"));
        assert_eq!(params, vec![json!(3)]);
    }

    #[test]
    fn count_query_counts_before_pagination() {
        let (sql, _) = SelectQuery::for_entity::<Permission>()
            .sort_by("name", SortDir::Asc)
            .offset(10)
            .limit(5)
            .to_count_sql()
            .unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"permissions\"");
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, params) = SelectQuery::for_entity::<User>()
            .filter_in("id", vec![])
            .to_sql()
            .unwrap();
        assert!(sql.ends_with("WHERE FALSE"));
        assert!(params.is_empty());
    }

    #[test]
    fn hostile_field_name_is_rejected() {
        let err = SelectQuery::for_entity::<User>()
            .filter_eq("id; DROP TABLE users", json!(1))
            .to_sql();
        assert!(err.is_err());
    }
}
