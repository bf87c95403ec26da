//! Entity trait and row transport between entities and the backing store.
//!
//! Rows travel as JSON object maps so that the same representation serves
//! the in-memory store, the PostgreSQL store (`to_jsonb` transport), and the
//! before/after snapshots written to the mutation log.

use armature_core::error::AppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A stored row: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Column names the engine stamps by convention.
pub const ID: &str = "id";
pub const DELETED: &str = "deleted";
pub const CREATOR_USER_ID: &str = "creator_user_id";
pub const MODIFIER_USER_ID: &str = "modifier_user_id";
pub const CREATED_UTC: &str = "created_utc";
pub const MODIFIED_UTC: &str = "modified_utc";

/// A persistent entity type.
///
/// Capabilities are declared as associated consts and the query/CRUD layers
/// branch on their presence:
///
/// * `SOFT_DELETE` — reads implicitly exclude rows flagged `deleted`;
///   "delete" flips the flag instead of removing the row.
/// * `TRACKED` — the engine stamps `creator_user_id`/`created_utc` on create
///   and `modifier_user_id`/`modified_utc` on update.
/// * `LOGGED` — mutations produce before/after Log Entries when the
///   mutation log is enabled.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    const SOFT_DELETE: bool = false;
    const TRACKED: bool = false;
    const LOGGED: bool = false;

    fn id(&self) -> i64;
}

/// Serialize any value into a row map.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::InternalError(anyhow::anyhow!(
            "value did not serialize to an object"
        ))),
        Err(e) => Err(AppError::InternalError(anyhow::Error::new(e))),
    }
}

/// Deserialize a stored row back into an entity.
pub fn from_row<E: DeserializeOwned>(row: Row) -> Result<E, AppError> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))
}
