//! Persistence and authorization core: request-scoped transaction contexts,
//! a capability-driven CRUD engine with soft-delete-aware queries, graph
//! permission checks, and per-request audit recording.

pub mod audit;
pub mod authz;
pub mod context;
pub mod crud;
pub mod db;
pub mod dispatch;
pub mod entity;
pub mod models;
pub mod query;
pub mod security;
pub mod store;

pub use armature_core::config::Settings;
pub use armature_core::error::AppError;
