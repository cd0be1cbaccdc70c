use log::warn;
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    middleware::AuthenticatedPrincipal,
    models::{Permission, Permissions, UserWithRole},
    queries,
    state::AppState,
    utils::verify_session_token,
};

pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub user_uid: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub confirmed: bool,
    pub role: String,
    pub permissions: Permissions,
}

impl From<&UserWithRole> for CurrentUser {
    fn from(loaded: &UserWithRole) -> Self {
        Self {
            user_uid: loaded.user.user_uid.clone(),
            email: loaded.user.email.clone(),
            first_name: loaded.user.first_name.clone(),
            last_name: loaded.user.last_name.clone(),
            confirmed: loaded.user.confirmed,
            role: loaded.role.name.clone(),
            permissions: loaded.role.permissions(),
        }
    }
}

/// Resolves the session cookie to an active user, with role loaded.
pub async fn get_current_user(cookies: &Cookies, state: &AppState) -> Option<UserWithRole> {
    let token = cookies.get(SESSION_COOKIE)?.value().to_string();

    let claims = match verify_session_token(&token, &state.config.security.secret_key) {
        Ok(claims) => claims,
        Err(_) => return None,
    };

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(err) => {
            warn!("could not load session user: {}", err);
            return None;
        }
    };

    let loaded = match queries::users::find_with_role(&mut conn, &claims.sub).await {
        Ok(loaded) => loaded?,
        Err(err) => {
            warn!("could not load session user: {}", err);
            return None;
        }
    };

    if loaded.user.is_active() {
        Some(loaded)
    } else {
        None
    }
}

pub async fn require_user(cookies: &Cookies, state: &AppState) -> Result<UserWithRole, AppError> {
    get_current_user(cookies, state)
        .await
        .ok_or(AppError::Unauthorized)
}

pub fn require_permission(loaded: &UserWithRole, permission: Permission) -> Result<(), AppError> {
    if loaded.role.active && loaded.role.has_permission(permission) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
