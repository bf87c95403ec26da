//! Backing-store seam.
//!
//! The framework talks to storage through `Store`/`StoreTx` so the core can
//! run against PostgreSQL in production and an in-memory store in tests.
//! A `StoreTx` is one transaction: everything written through it becomes
//! visible atomically at `commit` and is discarded wholesale at `rollback`.

pub mod memory;
pub mod postgres;

use armature_core::error::AppError;
use async_trait::async_trait;

use crate::entity::Row;
use crate::query::SelectQuery;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Execute a select, returning base-table rows.
    async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Row>, AppError>;

    /// Count the rows matching a select, before pagination.
    async fn count(&mut self, query: &SelectQuery) -> Result<i64, AppError>;

    /// Insert a row; the store assigns the id and returns the stored row.
    async fn insert(&mut self, table: &str, row: Row) -> Result<Row, AppError>;

    /// Merge the given columns into an existing row and return it.
    async fn update(&mut self, table: &str, id: i64, changes: Row) -> Result<Row, AppError>;

    /// Remove a row. This is a physical delete; soft-delete semantics live
    /// above this seam.
    async fn delete(&mut self, table: &str, id: i64) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

pub use memory::MemoryStore;
pub use postgres::PgStore;
