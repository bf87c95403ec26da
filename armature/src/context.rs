//! Request-scoped context: the current transaction and acting identity.
//!
//! One `RequestContext` exists per logical request and is passed explicitly
//! through call chains (no emulated thread-local ambience: isolation between
//! concurrent requests falls out of each request owning its own context).
//!
//! Scopes nest: the outermost `begin` opens the transaction and only that
//! scope's `end` may commit or roll it back. Nested scopes borrow the
//! transaction, optionally override the identity, and restore exactly the
//! state that was active before they began.

use armature_core::error::AppError;
use uuid::Uuid;

use crate::store::{Store, StoreTx};

/// The authenticated principal bound to a request, with the true actor
/// recorded alongside when the credential carries an impersonation claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub impersonator_id: Option<i64>,
}

impl Identity {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            impersonator_id: None,
        }
    }

    pub fn impersonated(user_id: i64, impersonator_id: i64) -> Self {
        Self {
            user_id,
            impersonator_id: Some(impersonator_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Rollback,
}

/// Opaque unwind token returned by `begin`. Scopes must end in LIFO order.
#[derive(Debug)]
#[must_use = "a scope must be ended with RequestContext::end"]
pub struct ScopeHandle {
    depth: usize,
    owns_tx: bool,
}

struct Frame {
    owns_tx: bool,
    /// `Some(prev)` when this frame overrode the identity; restored at end.
    saved_identity: Option<Option<Identity>>,
}

pub struct RequestContext {
    request_id: Uuid,
    mutation_log: bool,
    tx: Option<Box<dyn StoreTx>>,
    identity: Option<Identity>,
    frames: Vec<Frame>,
}

impl RequestContext {
    pub fn new(mutation_log: bool) -> Self {
        Self::with_request_id(Uuid::new_v4(), mutation_log)
    }

    pub fn with_request_id(request_id: Uuid, mutation_log: bool) -> Self {
        Self {
            request_id,
            mutation_log,
            tx: None,
            identity: None,
            frames: Vec::new(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn mutation_log_enabled(&self) -> bool {
        self.mutation_log
    }

    /// Open a scope. The outermost call begins a fresh transaction; nested
    /// calls reuse the active one and are no-ops with respect to
    /// commit/rollback. Supplying an identity overrides the current one for
    /// the lifetime of the scope.
    pub async fn begin(
        &mut self,
        store: &dyn Store,
        identity: Option<Identity>,
    ) -> Result<ScopeHandle, AppError> {
        let owns_tx = self.tx.is_none();
        if owns_tx {
            self.tx = Some(store.begin().await?);
        }
        let saved_identity = match identity {
            Some(identity) => Some(std::mem::replace(&mut self.identity, Some(identity))),
            None => None,
        };
        self.frames.push(Frame {
            owns_tx,
            saved_identity,
        });
        Ok(ScopeHandle {
            depth: self.frames.len(),
            owns_tx,
        })
    }

    /// The transaction bound to the active scope.
    pub fn transaction(&mut self) -> Result<&mut dyn StoreTx, AppError> {
        if self.frames.is_empty() {
            return Err(AppError::NoActiveContext);
        }
        match self.tx.as_deref_mut() {
            Some(tx) => Ok(tx),
            None => Err(AppError::NoActiveContext),
        }
    }

    /// The acting identity, absent for unauthenticated requests.
    pub fn identity(&self) -> Result<Option<&Identity>, AppError> {
        if self.frames.is_empty() {
            return Err(AppError::NoActiveContext);
        }
        Ok(self.identity.as_ref())
    }

    /// Close a scope, restoring whatever was active before its `begin`.
    /// Only the scope that created the transaction finalizes it; for nested
    /// scopes the outcome is ignored.
    pub async fn end(&mut self, handle: ScopeHandle, outcome: Outcome) -> Result<(), AppError> {
        if self.frames.len() != handle.depth {
            // Out-of-order unwind would clobber a scope this handle does
            // not own.
            return Err(AppError::NoActiveContext);
        }
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return Err(AppError::NoActiveContext),
        };
        if let Some(previous) = frame.saved_identity {
            self.identity = previous;
        }
        if !frame.owns_tx {
            return Ok(());
        }
        debug_assert!(handle.owns_tx);
        let tx = self.tx.take().ok_or(AppError::NoActiveContext)?;
        match outcome {
            Outcome::Commit => tx.commit().await,
            Outcome::Rollback => tx.rollback().await,
        }
    }
}
