//! Audit recording: one immutable entry per handled request.

use armature_core::error::AppError;
use chrono::Utc;
use serde_json::json;

use crate::context::RequestContext;
use crate::crud::Crud;
use crate::entity::{CREATED_UTC, Entity, ID, Row, from_row};
use crate::models::AuditEntry;
use crate::query::SortDir;

/// Everything known about a request at audit time. Identity and request id
/// come from the context, not the draft.
#[derive(Debug, Clone, Default)]
pub struct AuditDraft {
    pub client_host: String,
    pub method: String,
    pub url: String,
    pub headers: String,
    pub query_params: Option<String>,
    pub path_params: Option<String>,
    pub body: Option<String>,
    pub process_time_ms: Option<f64>,
    pub status_code: Option<i64>,
}

/// Write an audit entry inside the active transaction scope. The entry
/// shares the request's fate: rolling the request back discards it.
pub async fn record(ctx: &mut RequestContext, draft: AuditDraft) -> Result<AuditEntry, AppError> {
    let identity = ctx.identity()?.cloned();
    let mut row = Row::new();
    row.insert("client_host".to_string(), json!(draft.client_host));
    row.insert(
        "request_id".to_string(),
        json!(ctx.request_id().to_string()),
    );
    row.insert(
        "user_id".to_string(),
        json!(identity.as_ref().map(|i| i.user_id)),
    );
    row.insert(
        "impersonator_user_id".to_string(),
        json!(identity.as_ref().and_then(|i| i.impersonator_id)),
    );
    row.insert("method".to_string(), json!(draft.method));
    row.insert("url".to_string(), json!(draft.url));
    row.insert("headers".to_string(), json!(draft.headers));
    row.insert("query_params".to_string(), json!(draft.query_params));
    row.insert("path_params".to_string(), json!(draft.path_params));
    row.insert("body".to_string(), json!(draft.body));
    row.insert("process_time_ms".to_string(), json!(draft.process_time_ms));
    row.insert("status_code".to_string(), json!(draft.status_code));
    row.insert(CREATED_UTC.to_string(), json!(Utc::now()));
    let stored = ctx.transaction()?.insert(AuditEntry::TABLE, row).await?;
    from_row(stored)
}

/// Most recent audit entries, newest first.
pub async fn recent(ctx: &mut RequestContext, limit: i64) -> Result<Vec<AuditEntry>, AppError> {
    let query = Crud::<AuditEntry>::query()
        .sort_by(ID, SortDir::Desc)
        .limit(limit);
    Crud::<AuditEntry>::select(ctx, query).await
}
