use std::fmt;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    database::{get_uuid, DbSession},
    error::ModelError,
    models::{Permission, Permissions, User},
    queries,
};

/// Name of the role given to newly registered users.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_uid: String,
    pub name: String,
    pub description: String,
    pub raw_permissions: i64,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct RoleDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: Permissions,
}

pub const CANONICAL_ROLES: [RoleDefinition; 3] = [
    RoleDefinition {
        name: "user",
        description: "registered user permission",
        permissions: Permissions::REGISTERED,
    },
    RoleDefinition {
        name: "editor",
        description: "user has ability to edit all content and comments",
        permissions: Permissions::REGISTERED.union(Permissions::EDITOR),
    },
    RoleDefinition {
        name: "admin",
        description: "administrator user with access to all of the application",
        permissions: Permissions::REGISTERED
            .union(Permissions::EDITOR)
            .union(Permissions::ADMINISTRATOR),
    },
];

impl Role {
    pub fn new(name: &str, description: &str, permissions: Permissions) -> Self {
        let now = Utc::now();
        Self {
            role_uid: get_uuid(),
            name: name.to_string(),
            description: description.to_string(),
            raw_permissions: i64::from(permissions.bits()),
            active: true,
            created: now,
            updated: now,
        }
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits_truncate(self.raw_permissions)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(permission)
    }

    /// Users assigned to this role.
    pub async fn users(&self, conn: &mut SqliteConnection) -> Result<Vec<User>, sqlx::Error> {
        queries::roles::users_of(conn, &self.role_uid).await
    }

    /// Inserts the canonical roles, or restores their description and
    /// permissions when a role of that name already exists. The three upserts
    /// commit together.
    pub async fn initialize_role_table(session: &mut DbSession) -> Result<(), ModelError> {
        let mut scope = session.scope(true);
        let result: Result<(), ModelError> = async {
            for definition in CANONICAL_ROLES.iter() {
                let conn = scope.connection().await?;
                match queries::roles::find_by_name(&mut *conn, definition.name).await? {
                    None => {
                        let role = Role::new(
                            definition.name,
                            definition.description,
                            definition.permissions,
                        );
                        queries::roles::insert(conn, &role).await?;
                        info!("Inserted role {} ({})", role.name, definition.permissions);
                    }
                    Some(mut role) => {
                        role.description = definition.description.to_string();
                        role.raw_permissions = i64::from(definition.permissions.bits());
                        queries::roles::update(conn, &mut role).await?;
                        info!("Updated role {} ({})", role.name, definition.permissions);
                    }
                }
            }
            scope.commit().await?;
            Ok(())
        }
        .await;
        scope.finish(result).await
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "role_uid: {}", self.role_uid)?;
        writeln!(f, "name: {}, description: {}", self.name, self.description)?;
        writeln!(f, "permissions: {}", self.permissions())?;
        write!(f, "active: {}", if self.active { "True" } else { "False" })
    }
}

/// Role as listed on the admin page.
#[derive(Debug, Serialize)]
pub struct RoleSummary {
    pub role_uid: String,
    pub name: String,
    pub description: String,
    pub permissions: Permissions,
    pub active: bool,
    pub user_count: usize,
}

impl RoleSummary {
    pub fn new(role: Role, user_count: usize) -> Self {
        let permissions = role.permissions();
        Self {
            role_uid: role.role_uid,
            name: role.name,
            description: role.description,
            permissions,
            active: role.active,
            user_count,
        }
    }
}
