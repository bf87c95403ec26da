//! Audit entry model - one immutable record per HTTP interaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Append-only audit record. Written inside the request's transaction
/// scope, after the response is computed; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub client_host: String,
    #[serde(default)]
    pub request_id: Option<String>,
    /// Actor; absent for unauthenticated requests, which are still audited.
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub impersonator_user_id: Option<i64>,
    pub method: String,
    pub url: String,
    pub headers: String,
    #[serde(default)]
    pub query_params: Option<String>,
    #[serde(default)]
    pub path_params: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub process_time_ms: Option<f64>,
    #[serde(default)]
    pub status_code: Option<i64>,
    pub created_utc: DateTime<Utc>,
}

impl Entity for AuditEntry {
    const TABLE: &'static str = "audits";

    fn id(&self) -> i64 {
        self.id
    }
}
