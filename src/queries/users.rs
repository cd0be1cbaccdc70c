use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection};

use crate::models::{Role, User, UserWithRole};

pub async fn insert(conn: &mut SqliteConnection, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user" (user_uid, role_uid, first_name, last_name, email, password,
                            active, confirmed, created, updated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.user_uid)
    .bind(&user.role_uid)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(user.hashed_password())
    .bind(user.active)
    .bind(user.confirmed)
    .bind(user.created)
    .bind(user.updated)
    .execute(conn)
    .await?;

    Ok(())
}

/// Writes every mutable column back and refreshes `updated`.
pub async fn update(conn: &mut SqliteConnection, user: &mut User) -> Result<(), sqlx::Error> {
    user.updated = Utc::now();

    sqlx::query(
        r#"
        UPDATE "user"
        SET role_uid = ?, first_name = ?, last_name = ?, email = ?, password = ?,
            active = ?, confirmed = ?, updated = ?
        WHERE user_uid = ?
        "#,
    )
    .bind(&user.role_uid)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(user.hashed_password())
    .bind(user.active)
    .bind(user.confirmed)
    .bind(user.updated)
    .bind(&user.user_uid)
    .execute(conn)
    .await?;

    Ok(())
}

/// Soft delete: users are never removed, only marked inactive.
pub async fn deactivate(conn: &mut SqliteConnection, user: &mut User) -> Result<(), sqlx::Error> {
    user.active = false;
    update(conn, user).await
}

pub async fn find_by_uid(
    conn: &mut SqliteConnection,
    user_uid: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(r#"SELECT * FROM "user" WHERE user_uid = ?"#)
        .bind(user_uid)
        .fetch_optional(conn)
        .await
}

pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(r#"SELECT * FROM "user" WHERE email = ?"#)
        .bind(email)
        .fetch_optional(conn)
        .await
}

/// Loads a user together with its role in one joined query.
pub async fn find_with_role(
    conn: &mut SqliteConnection,
    user_uid: &str,
) -> Result<Option<UserWithRole>, sqlx::Error> {
    sqlx::query_as::<_, UserWithRole>(
        r#"
        SELECT u.user_uid, u.role_uid, u.first_name, u.last_name, u.email, u.password,
               u.active, u.confirmed, u.created, u.updated,
               r.name AS role_name, r.description AS role_description,
               r.raw_permissions AS role_raw_permissions, r.active AS role_active,
               r.created AS role_created, r.updated AS role_updated
        FROM "user" u
        JOIN role r ON r.role_uid = u.role_uid
        WHERE u.user_uid = ?
        "#,
    )
    .bind(user_uid)
    .fetch_optional(conn)
    .await
}

impl<'r> FromRow<'r, SqliteRow> for UserWithRole {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let user = User::from_row(row)?;
        let role = Role {
            role_uid: row.try_get("role_uid")?,
            name: row.try_get("role_name")?,
            description: row.try_get("role_description")?,
            raw_permissions: row.try_get("role_raw_permissions")?,
            active: row.try_get("role_active")?,
            created: row.try_get("role_created")?,
            updated: row.try_get("role_updated")?,
        };

        Ok(Self { user, role })
    }
}
