//! Database migrations and initialization.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{info, warn};

/// Version stamped into `PRAGMA user_version` once the schema is applied.
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize the SQLite database with schema and pragmas.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas_conn(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool).await?;

    info!(path = %db_path, "Database initialized");
    Ok(pool)
}

/// Apply the schema. Statements are idempotent, so re-running is harmless.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current: i64 = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await?
        .get(0);

    if current > SCHEMA_VERSION {
        warn!(
            found = current,
            expected = SCHEMA_VERSION,
            "Database schema is newer than this binary"
        );
    }

    let schema_sql = include_str!("schema.sql");
    let mut tx = pool.begin().await?;
    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(&mut *tx).await?;
        }
    }
    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION.max(current)))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(from = current, to = SCHEMA_VERSION.max(current), "Migrations applied");
    Ok(())
}

async fn configure_pragmas_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode reports the mode actually set; WAL may be refused on some filesystems.
    let journal_mode: String = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?
        .get(0);
    if journal_mode != "wal" {
        warn!(journal_mode = %journal_mode, "SQLite refused WAL journal mode");
    }

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
