//! In-memory store with snapshot-isolated transactions.
//!
//! Each transaction reads from a private copy of the data taken at `begin`
//! and records its writes as a delta; `commit` replays the delta onto the
//! shared state atomically, so transactions touching disjoint rows publish
//! independently, and `rollback` drops it. Ids come from a shared counter so
//! concurrent transactions never collide. Queries interpret the same
//! `SelectQuery` the PostgreSQL store renders to SQL, including joins and
//! the injected soft-delete predicates. Used by the test suite and useful
//! for embedding in examples.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use armature_core::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

use crate::entity::{DELETED, ID, Row};
use crate::query::{FilterOp, JoinKind, SelectQuery};
use crate::store::{Store, StoreTx};

#[derive(Debug, Default, Clone)]
struct Shared {
    tables: HashMap<String, BTreeMap<i64, Row>>,
    next_id: i64,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Shared>, AppError> {
        self.shared
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let working = self.lock()?.clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            working,
            ops: Vec::new(),
        }))
    }
}

/// One recorded write, replayed onto the shared state at commit.
#[derive(Debug, Clone)]
enum Op {
    Insert { table: String, id: i64, row: Row },
    Update { table: String, id: i64, changes: Row },
    Delete { table: String, id: i64 },
}

pub struct MemoryTx {
    shared: Arc<Mutex<Shared>>,
    working: Shared,
    ops: Vec<Op>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Row>, AppError> {
        let mut rows = evaluate(query, &self.working.tables);
        sort_rows(&mut rows, query);
        let skip = query.offset.unwrap_or(0).max(0) as usize;
        let mut rows: Vec<Row> = rows.into_iter().skip(skip).collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn count(&mut self, query: &SelectQuery) -> Result<i64, AppError> {
        Ok(evaluate(query, &self.working.tables).len() as i64)
    }

    async fn insert(&mut self, table: &str, mut row: Row) -> Result<Row, AppError> {
        // Ids are drawn from the shared counter so transactions committing
        // side by side never hand out the same id.
        let id = {
            let mut shared = self.shared.lock().map_err(|_| {
                AppError::InternalError(anyhow::anyhow!("memory store lock poisoned"))
            })?;
            shared.next_id += 1;
            shared.next_id
        };
        row.insert(ID.to_string(), Value::from(id));
        self.working
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, row.clone());
        self.ops.push(Op::Insert {
            table: table.to_string(),
            id,
            row: row.clone(),
        });
        Ok(row)
    }

    async fn update(&mut self, table: &str, id: i64, changes: Row) -> Result<Row, AppError> {
        let row = self
            .working
            .tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(&id))
            .ok_or_else(|| missing(table, id))?;
        for (column, value) in &changes {
            row.insert(column.clone(), value.clone());
        }
        let merged = row.clone();
        self.ops.push(Op::Update {
            table: table.to_string(),
            id,
            changes,
        });
        Ok(merged)
    }

    async fn delete(&mut self, table: &str, id: i64) -> Result<(), AppError> {
        self.working
            .tables
            .get_mut(table)
            .and_then(|rows| rows.remove(&id))
            .ok_or_else(|| missing(table, id))?;
        self.ops.push(Op::Delete {
            table: table.to_string(),
            id,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("memory store lock poisoned")))?;
        // Replay the delta instead of publishing the whole snapshot, so
        // writes committed by other transactions since `begin` survive.
        for op in self.ops {
            match op {
                Op::Insert { table, id, row } => {
                    shared.tables.entry(table).or_default().insert(id, row);
                }
                Op::Update { table, id, changes } => {
                    if let Some(row) = shared.tables.get_mut(&table).and_then(|t| t.get_mut(&id)) {
                        for (column, value) in changes {
                            row.insert(column, value);
                        }
                    }
                }
                Op::Delete { table, id } => {
                    shared.tables.get_mut(&table).and_then(|t| t.remove(&id));
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

fn missing(table: &str, id: i64) -> AppError {
    AppError::NotFound(anyhow::anyhow!("entity [{table}] with id={id} does not exist"))
}

fn is_deleted(row: &Row) -> bool {
    matches!(row.get(DELETED), Some(Value::Bool(true)))
}

/// Evaluate a query down to its matching base rows, pre-sort and
/// pre-pagination.
fn evaluate(query: &SelectQuery, tables: &HashMap<String, BTreeMap<i64, Row>>) -> Vec<Row> {
    // Working rows carry columns qualified as "table.column" so joins and
    // qualified filters can address any table in scope.
    let empty = BTreeMap::new();
    let base_rows = tables.get(&query.table).unwrap_or(&empty);

    let mut working: Vec<HashMap<String, Value>> = base_rows
        .values()
        .filter(|row| !query.base_soft_delete || !is_deleted(row))
        .map(|row| qualify_row(&query.table, row))
        .collect();

    for join in &query.joins {
        let join_rows = tables.get(&join.table).unwrap_or(&empty);
        let candidates: Vec<&Row> = join_rows
            .values()
            .filter(|row| !join.filter_deleted || !is_deleted(row))
            .collect();
        let right_column = join
            .right
            .split_once('.')
            .map(|(_, col)| col.to_string())
            .unwrap_or_else(|| join.right.clone());

        let mut next = Vec::new();
        for row in working {
            let left_value = row.get(&join.left).cloned().unwrap_or(Value::Null);
            let mut matched = false;
            for candidate in &candidates {
                let right_value = candidate.get(&right_column).cloned().unwrap_or(Value::Null);
                if !left_value.is_null() && left_value == right_value {
                    matched = true;
                    let mut merged = row.clone();
                    merged.extend(qualify_row(&join.table, candidate));
                    next.push(merged);
                }
            }
            if !matched && join.kind == JoinKind::Left {
                next.push(row);
            }
        }
        working = next;
    }

    working.retain(|row| {
        query.filters.iter().all(|filter| {
            let value = row
                .get(&query.qualify(&filter.field))
                .cloned()
                .unwrap_or(Value::Null);
            match &filter.op {
                FilterOp::Eq(expected) => &value == expected,
                FilterOp::In(values) => values.contains(&value),
                FilterOp::NotIn(values) => !values.contains(&value),
            }
        })
    });

    let id_column = format!("{}.{}", query.table, ID);
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for row in working {
        if query.distinct {
            let id = row.get(&id_column).cloned().unwrap_or(Value::Null);
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
        }
        out.push(unqualify_row(&query.table, &row));
    }
    out
}

fn qualify_row(table: &str, row: &Row) -> HashMap<String, Value> {
    row.iter()
        .map(|(column, value)| (format!("{table}.{column}"), value.clone()))
        .collect()
}

fn unqualify_row(table: &str, row: &HashMap<String, Value>) -> Row {
    let prefix = format!("{table}.");
    let mut out = Row::new();
    for (column, value) in row {
        if let Some(name) = column.strip_prefix(&prefix) {
            out.insert(name.to_string(), value.clone());
        }
    }
    out
}

fn sort_rows(rows: &mut [Row], query: &SelectQuery) {
    if query.sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for (field, dir) in &query.sort {
            let field = field.rsplit('.').next().unwrap_or(field);
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ordering = match dir {
                crate::query::SortDir::Asc => compare_values(left, right),
                crate::query::SortDir::Desc => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
