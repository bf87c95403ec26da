//! Request dispatch: the outer loop that owns the transaction scope.
//!
//! `Dispatcher::handle` wraps one logical request: it resolves the caller's
//! identity from the bearer token, opens the request's transaction scope,
//! runs the handler, and finalizes. A successful handler gets an audit entry
//! recorded in the same transaction and then a commit; a failed handler
//! rolls everything back, audit included, so storage never shows a
//! half-applied request.

use std::sync::Arc;
use std::time::Instant;

use armature_core::error::AppError;
use futures::future::BoxFuture;
use tracing::info;

use crate::audit::{AuditDraft, record};
use crate::context::{Outcome, RequestContext};
use crate::crud::Crud;
use crate::crud::users::UserCrud;
use crate::models::User;
use crate::security::TokenCodec;
use crate::store::Store;

/// Transport-level facts about a request, supplied by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub client_host: String,
    pub method: String,
    pub url: String,
    pub headers: String,
    pub query_params: Option<String>,
    pub path_params: Option<String>,
    pub body: Option<String>,
    /// Bearer token, absent for anonymous requests.
    pub token: Option<String>,
    /// Status the transport responds with when the handler succeeds
    /// (201 for creations, 204 for deletions, and so on); 200 when unset.
    pub success_status: Option<i64>,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    tokens: TokenCodec,
    mutation_log: bool,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, tokens: TokenCodec, mutation_log: bool) -> Self {
        Self {
            store,
            tokens,
            mutation_log,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Run one request end to end. Anonymous requests are handled (and
    /// audited) with no identity; a present but invalid token is rejected
    /// before any scope opens.
    pub async fn handle<T, F>(&self, meta: RequestMeta, handler: F) -> Result<T, AppError>
    where
        F: for<'a> FnOnce(&'a mut RequestContext) -> BoxFuture<'a, Result<T, AppError>>,
    {
        let identity = match &meta.token {
            Some(token) => Some(self.tokens.decode(token)?),
            None => None,
        };

        let started = Instant::now();
        let mut ctx = RequestContext::new(self.mutation_log);
        let scope = ctx.begin(self.store.as_ref(), identity).await?;

        let outcome = self.run(&mut ctx, meta, started, handler).await;
        match outcome {
            Ok(value) => {
                ctx.end(scope, Outcome::Commit).await?;
                Ok(value)
            }
            Err(err) => {
                ctx.end(scope, Outcome::Rollback).await?;
                Err(err)
            }
        }
    }

    async fn run<T, F>(
        &self,
        ctx: &mut RequestContext,
        meta: RequestMeta,
        started: Instant,
        handler: F,
    ) -> Result<T, AppError>
    where
        F: for<'a> FnOnce(&'a mut RequestContext) -> BoxFuture<'a, Result<T, AppError>>,
    {
        if let Some(identity) = ctx.identity()?.cloned() {
            let user = Crud::<User>::get(ctx, identity.user_id).await?;
            UserCrud::ensure_active(&user)?;
        }

        let value = handler(ctx).await?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let entry = record(
            ctx,
            AuditDraft {
                client_host: meta.client_host,
                method: meta.method,
                url: meta.url,
                headers: meta.headers,
                query_params: meta.query_params,
                path_params: meta.path_params,
                body: meta.body,
                process_time_ms: Some(elapsed_ms),
                status_code: Some(meta.success_status.unwrap_or(200)),
            },
        )
        .await?;
        info!(
            request_id = %ctx.request_id(),
            audit_id = entry.id,
            elapsed_ms,
            "request handled"
        );
        Ok(value)
    }
}
