//! Log entry model - before/after snapshots of entity mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;

/// Append-only mutation record: `before` is null on create, `after` is
/// null on delete. Correlated to the owning request by `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    #[serde(default)]
    pub request_id: Option<String>,
    pub entity: String,
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
    pub created_utc: DateTime<Utc>,
}

impl Entity for LogEntry {
    const TABLE: &'static str = "logs";

    fn id(&self) -> i64 {
        self.id
    }
}
