//! Backup metadata repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::backup::{BackupKind, BackupRecord, BackupStatus};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for finalized backup records.
#[derive(Clone)]
pub struct BackupRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct BackupRow {
    id: String,
    filename: String,
    label: String,
    kind: String,
    size_bytes: Option<i64>,
    created_at: String,
    status: String,
    error: Option<String>,
}

impl BackupRow {
    fn into_record(self) -> Result<BackupRecord> {
        let kind: BackupKind = self
            .kind
            .parse()
            .map_err(|err| AppError::Db(format!("invalid backup kind: {err}")))?;
        let status: BackupStatus = self
            .status
            .parse()
            .map_err(|err| AppError::Db(format!("invalid backup status: {err}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let size_bytes = self
            .size_bytes
            .map(u64::try_from)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid size_bytes: {e}")))?;

        Ok(BackupRecord {
            id: self.id,
            filename: self.filename,
            label: self.label,
            kind,
            size_bytes,
            created_at,
            status,
            error: self.error,
        })
    }
}

impl BackupRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a backup record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert(&self, record: &BackupRecord) -> Result<()> {
        let size = record
            .size_bytes
            .map(i64::try_from)
            .transpose()
            .map_err(|e| AppError::Db(format!("size_bytes out of range: {e}")))?;

        sqlx::query(
            "INSERT INTO backup (id, filename, label, kind, size_bytes, created_at, status, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 size_bytes = excluded.size_bytes,
                 status = excluded.status,
                 error = excluded.error",
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(&record.label)
        .bind(record.kind.as_str())
        .bind(size)
        .bind(record.created_at.to_rfc3339())
        .bind(record.status.as_str())
        .bind(&record.error)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Retrieve a record by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<BackupRecord>> {
        let row: Option<BackupRow> = sqlx::query_as(
            "SELECT id, filename, label, kind, size_bytes, created_at, status, error
             FROM backup WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(BackupRow::into_record).transpose()
    }

    /// All records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<BackupRecord>> {
        let rows: Vec<BackupRow> = sqlx::query_as(
            "SELECT id, filename, label, kind, size_bytes, created_at, status, error
             FROM backup ORDER BY created_at DESC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(BackupRow::into_record).collect()
    }

    /// Delete a record. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backup WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
