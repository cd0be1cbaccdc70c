use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::Json,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies};

use crate::{
    database::DbSession,
    error::{AppError, ModelError},
    middleware::{require_user, AuthenticatedPrincipal, CurrentUser, SESSION_COOKIE},
    models::{User, DEFAULT_ROLE},
    queries,
    state::AppState,
    utils::{auth::SESSION_HOURS, create_session_token},
};

/// Lifetime of password reset links, in minutes.
pub const RESET_TOKEN_TIMEOUT: i64 = 10;

#[derive(Deserialize)]
pub struct RegisterForm {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct ResetRequestForm {
    email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordForm {
    password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_uid: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub confirmed: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_uid: user.user_uid.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            active: user.active,
            confirmed: user.confirmed,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_taken() -> AppError {
    AppError::BadRequest("email already registered".to_string())
}

/// A concurrent registration can pass the lookup and still hit the UNIQUE
/// constraint on insert.
fn insert_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => email_taken(),
        err => err.into(),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let email = normalize_email(&form.email);
    if email.is_empty()
        || form.password.is_empty()
        || form.first_name.trim().is_empty()
        || form.last_name.trim().is_empty()
    {
        return Err(AppError::BadRequest("all fields are required".to_string()));
    }

    let mut session = DbSession::new(state.db.clone());
    let mut scope = session.scope(true);
    let result: Result<User, AppError> = async {
        let conn = scope.connection().await?;
        if queries::users::find_by_email(&mut *conn, &email).await?.is_some() {
            return Err(email_taken());
        }

        let role = queries::roles::find_by_name(&mut *conn, DEFAULT_ROLE)
            .await?
            .ok_or(ModelError::NotFound("role"))?;
        let user = User::new(
            &role.role_uid,
            form.first_name.trim(),
            form.last_name.trim(),
            &email,
            &form.password,
        )?;
        queries::users::insert(conn, &user)
            .await
            .map_err(insert_error)?;
        scope.commit().await?;
        Ok(user)
    }
    .await;
    let user = scope.finish(result).await?;

    let token = user.confirmation_token(&state.config.security)?;
    info!("Registered user {}", user.user_uid);
    debug!("confirmation link for {}: /auth/confirm/{}", user.email, token);

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Json<UserResponse>, AppError> {
    let mut conn = state.db.acquire().await?;
    let user = queries::users::find_by_email(&mut conn, &normalize_email(&form.email)).await?;
    drop(conn);

    let user = match user {
        Some(user) if user.is_active() && user.verify_password(&form.password) => user,
        _ => return Err(AppError::InvalidCredentials),
    };

    let token = create_session_token(&user, &state.config.security.secret_key)
        .map_err(ModelError::from)?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(SESSION_HOURS))
        .build();
    cookies.add(cookie);

    info!("User {} logged in", user.user_uid);
    Ok(Json(UserResponse::from(&user)))
}

pub async fn logout(cookies: Cookies) -> StatusCode {
    cookies.remove(Cookie::from(SESSION_COOKIE));
    StatusCode::NO_CONTENT
}

pub async fn me(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<CurrentUser>, AppError> {
    let loaded = require_user(&cookies, &state).await?;
    Ok(Json(CurrentUser::from(&loaded)))
}

pub async fn confirm(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(token): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let mut user = require_user(&cookies, &state).await?.user;
    if user.confirmed {
        return Ok(Json(UserResponse::from(&user)));
    }

    let mut session = DbSession::new(state.db.clone());
    if !user.confirm_token(&token, &state.config.security, &mut session).await? {
        return Err(AppError::InvalidLink);
    }
    session.commit().await?;

    info!("User {} confirmed their email", user.user_uid);
    Ok(Json(UserResponse::from(&user)))
}

/// Always answers 202 so the endpoint does not reveal which emails exist.
pub async fn reset_password_request(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> Result<StatusCode, AppError> {
    let mut conn = state.db.acquire().await?;
    let user = queries::users::find_by_email(&mut conn, &normalize_email(&form.email)).await?;

    if let Some(user) = user.filter(|user| user.is_active()) {
        let token = user.get_reset_token(RESET_TOKEN_TIMEOUT, &state.config.security)?;
        debug!(
            "password reset link for {}: /auth/reset_password/{}",
            user.email, token
        );
    }

    Ok(StatusCode::ACCEPTED)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<StatusCode, AppError> {
    let user_uid = User::verify_reset_token(&token, &state.config.security).map_err(|err| {
        debug!("reset token rejected: {}", err);
        AppError::InvalidLink
    })?;
    if form.password.is_empty() {
        return Err(AppError::BadRequest("password is required".to_string()));
    }

    let mut session = DbSession::new(state.db.clone());
    let mut scope = session.scope(true);
    let result: Result<(), AppError> = async {
        let conn = scope.connection().await?;
        let mut user = queries::users::find_by_uid(&mut *conn, &user_uid)
            .await?
            .filter(|user| user.is_active())
            .ok_or(AppError::InvalidLink)?;
        user.set_password(&form.password)?;
        queries::users::update(conn, &mut user).await?;
        scope.commit().await?;
        Ok(())
    }
    .await;
    scope.finish(result).await?;

    info!("Password reset for user {}", user_uid);
    Ok(StatusCode::NO_CONTENT)
}
