use axum::{extract::State, response::Json};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    middleware::{require_permission, require_user},
    models::{Permission, RoleSummary},
    queries,
    state::AppState,
};

pub async fn list_roles(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<Vec<RoleSummary>>, AppError> {
    let current_user = require_user(&cookies, &state).await?;
    require_permission(&current_user, Permission::Administrator)?;

    let mut conn = state.db.acquire().await?;
    let roles = queries::roles::list(&mut conn).await?;

    let mut summaries = Vec::with_capacity(roles.len());
    for role in roles {
        let user_count = role.users(&mut conn).await?.len();
        summaries.push(RoleSummary::new(role, user_count));
    }

    Ok(Json(summaries))
}
