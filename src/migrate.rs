//! Database schema creation (idempotent).
//!
//! | Table | Role |
//! |-------|------|
//! | `roots` | crawl roots with cached scan statistics |
//! | `files` | the catalog, unique on `(root_id, path)` |
//! | `index_map` | one row per indexed file: FTS rowid + fingerprint |
//! | `root_permissions` | per-root access grants |
//! | `docs` | FTS5 full-text index (`content`, `filename`, `ext`) |
//!
//! Deleting a root cascades to its files, their mappings, and its grants.
//! FTS5 tables cannot take part in foreign keys, so the trigger
//! `index_map_after_delete` removes the index document a mapping pointed at.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::Result;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables, indexes, and triggers on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            last_scan_at INTEGER,
            files_count INTEGER,
            total_size_bytes INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            root_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            ext TEXT,
            size INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(root_id, path),
            FOREIGN KEY (root_id) REFERENCES roots(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_map (
            file_id INTEGER PRIMARY KEY,
            doc_rowid INTEGER,
            fingerprint TEXT NOT NULL,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS root_permissions (
            root_id INTEGER NOT NULL,
            principal TEXT NOT NULL,
            access_level TEXT NOT NULL CHECK (access_level IN ('read', 'write', 'admin')),
            created_at INTEGER NOT NULL,
            UNIQUE(root_id, principal),
            FOREIGN KEY (root_id) REFERENCES roots(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='docs'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE docs USING fts5(
                content,
                filename,
                ext,
                tokenize = 'unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS index_map_after_delete
        AFTER DELETE ON index_map
        WHEN old.doc_rowid IS NOT NULL
        BEGIN
            DELETE FROM docs WHERE rowid = old.doc_rowid;
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_root_id ON files(root_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_mtime ON files(mtime DESC, id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_ext ON files(ext)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_map_doc ON index_map(doc_rowid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_permissions_principal ON root_permissions(principal)")
        .execute(pool)
        .await?;

    Ok(())
}
