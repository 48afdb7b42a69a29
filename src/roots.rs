//! Crawl root records.
//!
//! Roots are created and removed by an operator; the scanner only updates
//! the cached statistics columns. Deleting a root cascades through its
//! files, their index mappings (and, via trigger, their index documents),
//! and its permission grants.

use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Root;

/// True for Windows network paths (`\\server\share` or `//server/share`).
pub fn is_unc(path: &str) -> bool {
    path.starts_with("\\\\") || path.starts_with("//")
}

fn row_to_root(row: &sqlx::sqlite::SqliteRow) -> Root {
    Root {
        id: row.get("id"),
        path: row.get("path"),
        last_scan_at: row.get("last_scan_at"),
        files_count: row.get("files_count"),
        total_size_bytes: row.get("total_size_bytes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Register a root. Relative local paths are made absolute against the
/// working directory; UNC paths are stored as given.
pub async fn create_root(pool: &SqlitePool, path: &str) -> Result<Root> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("root path must not be empty".into()));
    }

    let stored = if is_unc(trimmed) || Path::new(trimmed).is_absolute() {
        trimmed.to_string()
    } else {
        std::env::current_dir()?
            .join(trimmed)
            .to_string_lossy()
            .into_owned()
    };

    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("INSERT INTO roots (path, created_at, updated_at) VALUES (?, ?, ?)")
        .bind(&stored)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await;

    match result {
        Ok(done) => get_root(pool, done.last_insert_rowid()).await,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            Error::Validation(format!("root already registered: {}", stored)),
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_root(pool: &SqlitePool, id: i64) -> Result<Root> {
    let row = sqlx::query(
        "SELECT id, path, last_scan_at, files_count, total_size_bytes, created_at, updated_at \
         FROM roots WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref()
        .map(row_to_root)
        .ok_or_else(|| Error::NotFound(format!("root {}", id)))
}

pub async fn list_roots(pool: &SqlitePool) -> Result<Vec<Root>> {
    let rows = sqlx::query(
        "SELECT id, path, last_scan_at, files_count, total_size_bytes, created_at, updated_at \
         FROM roots ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_root).collect())
}

pub async fn root_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT id FROM roots ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Remove a root and everything it owns.
pub async fn delete_root(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM roots WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("root {}", id)));
    }
    Ok(())
}
