pub mod permissions;
pub mod role;
pub mod user;

pub use permissions::{Permission, Permissions};
pub use role::{Role, RoleDefinition, RoleSummary, CANONICAL_ROLES, DEFAULT_ROLE};
pub use user::{User, UserWithRole};
