//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so this is safe
//! to re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS backup (
    id              TEXT PRIMARY KEY NOT NULL,
    filename        TEXT NOT NULL,
    label           TEXT NOT NULL,
    kind            TEXT NOT NULL CHECK(kind IN ('full','data-only')),
    size_bytes      INTEGER,
    created_at      TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('creating','ready','failed')),
    error           TEXT
);

CREATE INDEX IF NOT EXISTS idx_backup_created ON backup(created_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
