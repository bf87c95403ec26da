//! armature-core: Shared infrastructure for the armature framework.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
