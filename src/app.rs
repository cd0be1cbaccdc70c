use axum::{
    routing::{get, post},
    Router,
};
use log::info;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    database::{create_database_pool, DbSession},
    error::ModelError,
    handlers,
    models::Role,
    state::AppState,
};

/// Connects to the database, applies migrations and seeds the role table.
pub async fn bootstrap(config: AppConfig) -> Result<AppState, ModelError> {
    let db = create_database_pool(&config.database_url).await?;

    let mut session = DbSession::new(db.clone());
    Role::initialize_role_table(&mut session).await?;
    info!("Role table initialized");

    Ok(AppState::new(db, config))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/confirm/:token", get(handlers::auth::confirm))
        .route(
            "/auth/reset_password_request",
            post(handlers::auth::reset_password_request),
        )
        .route(
            "/auth/reset_password/:token",
            post(handlers::auth::reset_password),
        )
        .route("/admin/roles", get(handlers::roles::list_roles))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new()),
        )
        .with_state(state)
}
