pub mod audit;
pub mod log;
pub mod permission;
pub mod role;
pub mod user;

pub use audit::AuditEntry;
pub use log::LogEntry;
pub use permission::{
    Permission, PermissionCreate, PermissionUpdate, RolePermission, RolePermissionCreate,
};
pub use role::{Role, RoleCreate, RoleUpdate, UserRole, UserRoleCreate};
pub use user::{User, UserCreate, UserPasswordChange, UserUpdate};
