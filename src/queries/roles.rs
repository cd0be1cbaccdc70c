use chrono::Utc;
use sqlx::SqliteConnection;

use crate::models::{Role, User};

pub async fn insert(conn: &mut SqliteConnection, role: &Role) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO role (role_uid, name, description, raw_permissions, active, created, updated)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&role.role_uid)
    .bind(&role.name)
    .bind(&role.description)
    .bind(role.raw_permissions)
    .bind(role.active)
    .bind(role.created)
    .bind(role.updated)
    .execute(conn)
    .await?;

    Ok(())
}

/// Writes description, permissions and status back. `role_uid` and `name` never change.
pub async fn update(conn: &mut SqliteConnection, role: &mut Role) -> Result<(), sqlx::Error> {
    role.updated = Utc::now();

    sqlx::query(
        r#"
        UPDATE role
        SET description = ?, raw_permissions = ?, active = ?, updated = ?
        WHERE role_uid = ?
        "#,
    )
    .bind(&role.description)
    .bind(role.raw_permissions)
    .bind(role.active)
    .bind(role.updated)
    .bind(&role.role_uid)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM role WHERE name = ?")
        .bind(name)
        .fetch_optional(conn)
        .await
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM role ORDER BY raw_permissions, name")
        .fetch_all(conn)
        .await
}

pub async fn users_of(
    conn: &mut SqliteConnection,
    role_uid: &str,
) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(r#"SELECT * FROM "user" WHERE role_uid = ? ORDER BY created"#)
        .bind(role_uid)
        .fetch_all(conn)
        .await
}
