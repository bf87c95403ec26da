//! Role model - named permission bundles and the user-role join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entity::Entity;

/// Role entity. Soft-deletable: deprecation flags the row instead of
/// removing it, and ordinary reads exclude flagged rows. Activation and
/// locking are independent switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub creator_user_id: Option<i64>,
    #[serde(default)]
    pub modifier_user_id: Option<i64>,
    pub created_utc: DateTime<Utc>,
    #[serde(default)]
    pub modified_utc: Option<DateTime<Utc>>,
}

impl Entity for Role {
    const TABLE: &'static str = "roles";
    const SOFT_DELETE: bool = true;
    const TRACKED: bool = true;
    const LOGGED: bool = true;

    fn id(&self) -> i64 {
        self.id
    }
}

/// User-role association. Records who granted the role and when; removed
/// either by ordinary (soft) delete or purged outright at deprecation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub creator_user_id: Option<i64>,
    #[serde(default)]
    pub modifier_user_id: Option<i64>,
    pub created_utc: DateTime<Utc>,
    #[serde(default)]
    pub modified_utc: Option<DateTime<Utc>>,
}

impl Entity for UserRole {
    const TABLE: &'static str = "users_roles";
    const SOFT_DELETE: bool = true;
    const TRACKED: bool = true;
    const LOGGED: bool = true;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RoleCreate {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RoleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
}

/// Input for the user-role join; stamps come from the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserRoleCreate {
    pub user_id: i64,
    pub role_id: i64,
}
