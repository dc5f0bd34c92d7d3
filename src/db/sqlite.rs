use crate::db::schema::SQLITE_INIT;
use crate::error::OpsError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Row-level access to every table. Query methods are split across the
/// sibling modules (`kitchens.rs`, `tasks.rs`, ...) as `impl OpsStorage` blocks.
#[derive(Clone)]
pub struct OpsStorage {
    pool: SqlitePool,
}

impl OpsStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect (creating the file when missing), enable foreign keys and
    /// apply the bundled schema.
    pub async fn open(database_url: &str) -> Result<Self, OpsError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        info!(database_url, "database ready");
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), OpsError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Maps "no row affected" to a typed 404.
pub(crate) fn expect_affected(
    result: sqlx::sqlite::SqliteQueryResult,
    what: &'static str,
) -> Result<(), OpsError> {
    if result.rows_affected() == 0 {
        Err(OpsError::NotFound(what))
    } else {
        Ok(())
    }
}
