use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use log::{debug, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::ModelError;

pub type Database = Pool<Sqlite>;

pub async fn create_database_pool(database_url: &str) -> Result<Database, ModelError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    // Test the connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    run_migrations(&pool).await?;
    info!("Connected to database at {}", database_url);
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// Every connection to `sqlite::memory:` opens its own database, so the pool is
/// pinned to one connection that never expires.
pub async fn connect_in_memory() -> Result<Database, ModelError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(db: &Database) -> Result<(), ModelError> {
    sqlx::migrate!("./migrations").run(db).await?;
    debug!("database migrations applied");
    Ok(())
}

/// Generates a primary key: a v4 UUID as 32 lowercase hex characters.
pub fn get_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A unit-of-work handle over the pool.
///
/// A transaction is opened lazily on first use and stays open until it is
/// committed, rolled back or the session is closed. Closing drops the
/// transaction, which rolls back anything uncommitted and hands the connection
/// back to the pool.
pub struct DbSession {
    pool: Database,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl DbSession {
    pub fn new(pool: Database) -> Self {
        Self { pool, tx: None }
    }

    pub async fn connection(&mut self) -> Result<&mut SqliteConnection, sqlx::Error> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        Ok(&mut **self.tx.insert(tx))
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!("session closed with uncommitted changes, discarding them");
        }
    }

    /// Enters a scope over this session. See [`SessionScope`].
    pub fn scope(&mut self, close: bool) -> SessionScope<'_> {
        SessionScope {
            session: self,
            close,
            finished: false,
        }
    }
}

/// Guard over a [`DbSession`] for one logical operation.
///
/// [`SessionScope::finish`] rolls back when handed an error and returns that
/// error untouched. When `close` is set the session is closed on exit. A scope
/// dropped without `finish` (early return or panic) rolls back.
pub struct SessionScope<'s> {
    session: &'s mut DbSession,
    close: bool,
    finished: bool,
}

impl SessionScope<'_> {
    pub async fn finish<T, E>(mut self, result: Result<T, E>) -> Result<T, E> {
        if result.is_err() {
            if let Err(err) = self.session.rollback().await {
                warn!("rollback failed: {}", err);
            }
        }
        self.finished = true;
        result
    }
}

impl Deref for SessionScope<'_> {
    type Target = DbSession;

    fn deref(&self) -> &DbSession {
        self.session
    }
}

impl DerefMut for SessionScope<'_> {
    fn deref_mut(&mut self) -> &mut DbSession {
        self.session
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        if !self.finished && self.session.tx.take().is_some() {
            warn!("session scope abandoned, rolling back");
        }
        if self.close {
            self.session.close();
        }
    }
}
