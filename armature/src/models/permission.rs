//! Permission model - capability tokens and the role-permission join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entity::Entity;

/// Permission entity. Never soft-deleted: deprecation removes all role
/// associations and keeps the record as a historical artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub creator_user_id: Option<i64>,
    #[serde(default)]
    pub modifier_user_id: Option<i64>,
    pub created_utc: DateTime<Utc>,
    #[serde(default)]
    pub modified_utc: Option<DateTime<Utc>>,
}

impl Entity for Permission {
    const TABLE: &'static str = "permissions";
    const TRACKED: bool = true;
    const LOGGED: bool = true;

    fn id(&self) -> i64 {
        self.id
    }
}

/// Role-permission association with grant attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: i64,
    pub role_id: i64,
    pub permission_id: i64,
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

impl Entity for RolePermission {
    const TABLE: &'static str = "roles_permissions";
    const SOFT_DELETE: bool = true;
    const TRACKED: bool = true;
    const LOGGED: bool = true;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PermissionCreate {
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PermissionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub name: Option<String>,
}

/// Input for the role-permission join; stamps come from the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RolePermissionCreate {
    pub role_id: i64,
    pub permission_id: i64,
}
