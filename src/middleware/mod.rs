pub mod identity;
pub mod permission;

pub use identity::AuthenticatedPrincipal;
pub use permission::{
    get_current_user, require_permission, require_user, CurrentUser, SESSION_COOKIE,
};
