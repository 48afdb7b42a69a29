//! Incremental full-text indexer.
//!
//! Keeps the FTS5 `docs` table in step with the catalog. A catalog entry
//! is re-extracted only when its `(size, mtime)` fingerprint differs from
//! the one recorded in `index_map`, or when the run is forced.
//!
//! For each file that needs work the old index document is deleted and
//! the replacement inserted in the same transaction, so a file never has
//! two live documents. Reading and extraction (on the blocking pool)
//! happen before the write transaction of their batch is opened; a file
//! that cannot be read is counted as an error and its previous document
//! stays in place. A file that reads fine but
//! yields no text (corrupt, encrypted, empty) is still indexed, with
//! empty content.

use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Writer;
use crate::error::{Error, Result};
use crate::extract::{self, ContentKind, Extractor};
use crate::filter::{normalize_extensions, FileFilter, Predicate};
use crate::models::{CatalogEntry, Fingerprint, IndexMapping, IndexRunSummary};
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug, Clone, Default)]
pub struct ReindexOptions {
    pub root_id: Option<i64>,
    /// Must be a subset of [`extract::SUPPORTED_EXTENSIONS`].
    pub extensions: Option<Vec<String>>,
    pub limit: Option<i64>,
    /// Re-extract even when the fingerprint is unchanged.
    pub force: bool,
}

impl ReindexOptions {
    /// Validate the request and return the candidate filter.
    pub fn to_filter(&self) -> Result<FileFilter> {
        if let Some(limit) = self.limit {
            if limit < 1 {
                return Err(Error::Validation("limit must be >= 1".into()));
            }
        }

        let extensions = match &self.extensions {
            Some(requested) => {
                let exts = normalize_extensions(requested);
                if exts.is_empty() {
                    return Err(Error::Validation("extension filter is empty".into()));
                }
                if let Some(bad) = exts.iter().find(|e| !extract::is_supported(e)) {
                    return Err(Error::Validation(format!(
                        "unsupported extension '{}' (supported: {})",
                        bad,
                        extract::SUPPORTED_EXTENSIONS.join(", ")
                    )));
                }
                exts
            }
            None => extract::SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        };

        let mut filter = FileFilter::new().and(Predicate::ExtIn(extensions));
        if let Some(root_id) = self.root_id {
            filter.push(Predicate::RootIs(root_id));
        }
        Ok(filter)
    }
}

/// Catalog entries to consider, newest first.
pub async fn select_candidates(
    pool: &SqlitePool,
    filter: &FileFilter,
    limit: Option<i64>,
) -> Result<Vec<CatalogEntry>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT f.id, f.root_id, f.path, f.name, f.ext, f.size, f.mtime, f.created_at, \
         f.updated_at FROM files f WHERE 1=1",
    );
    filter.push_conditions(&mut qb, "f");
    qb.push(" ORDER BY f.mtime DESC, f.id ASC");
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| CatalogEntry {
            id: row.get("id"),
            root_id: row.get("root_id"),
            path: row.get("path"),
            name: row.get("name"),
            ext: row.get("ext"),
            size: row.get("size"),
            mtime: row.get("mtime"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}

pub async fn find_mapping(conn: &mut SqliteConnection, file_id: i64) -> Result<Option<IndexMapping>> {
    let row = sqlx::query("SELECT file_id, doc_rowid, fingerprint FROM index_map WHERE file_id = ?")
        .bind(file_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|row| IndexMapping {
        file_id: row.get("file_id"),
        doc_rowid: row.get("doc_rowid"),
        fingerprint: row.get("fingerprint"),
    }))
}

/// Replace the index document of `entry` with `text` and repoint its
/// mapping. Returns the new document rowid.
pub async fn replace_document(
    conn: &mut SqliteConnection,
    entry: &CatalogEntry,
    previous: Option<&IndexMapping>,
    fingerprint: &Fingerprint,
    text: &str,
) -> Result<i64> {
    if let Some(old) = previous.and_then(|m| m.doc_rowid) {
        sqlx::query("DELETE FROM docs WHERE rowid = ?")
            .bind(old)
            .execute(&mut *conn)
            .await?;
    }

    let rowid = sqlx::query("INSERT INTO docs (content, filename, ext) VALUES (?, ?, ?)")
        .bind(text)
        .bind(&entry.name)
        .bind(entry.ext.as_deref().unwrap_or(""))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO index_map (file_id, doc_rowid, fingerprint) VALUES (?, ?, ?)
        ON CONFLICT(file_id) DO UPDATE SET
            doc_rowid = excluded.doc_rowid,
            fingerprint = excluded.fingerprint
        "#,
    )
    .bind(entry.id)
    .bind(rowid)
    .bind(fingerprint.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(rowid)
}

/// A candidate whose text has been extracted and awaits its write batch.
struct Prepared<'a> {
    entry: &'a CatalogEntry,
    fingerprint: Fingerprint,
    text: String,
}

pub async fn run_reindex(
    writer: &Writer,
    config: &Config,
    extractor: &Extractor,
    progress: &dyn ProgressReporter,
    options: &ReindexOptions,
) -> Result<IndexRunSummary> {
    let filter = options.to_filter()?;
    let started = Instant::now();
    let pool = writer.pool();

    let candidates = select_candidates(pool, &filter, options.limit).await?;
    let total = candidates.len() as u64;
    let mut summary = IndexRunSummary {
        candidates: total,
        ..Default::default()
    };
    let mut batch: Vec<Prepared> = Vec::with_capacity(config.index.batch_size);

    for (i, entry) in candidates.iter().enumerate() {
        let n = i as u64 + 1;
        if n % config.index.progress_every == 0 {
            progress.report(ProgressEvent::Indexing { n, total });
        }

        let fingerprint = Fingerprint::of(entry);
        if !options.force {
            let mut conn = pool.acquire().await?;
            let mapping = find_mapping(&mut conn, entry.id).await?;
            if mapping.is_some_and(|m| fingerprint.matches(&m.fingerprint)) {
                summary.skipped += 1;
                continue;
            }
        }

        let Some(kind) = entry.ext.as_deref().and_then(ContentKind::from_extension) else {
            summary.skipped += 1;
            continue;
        };

        let bytes = match tokio::fs::read(&entry.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %entry.path, error = %e, "cannot read file");
                summary.errors += 1;
                continue;
            }
        };

        let worker = extractor.clone();
        let text = match tokio::task::spawn_blocking(move || worker.extract_bytes(&bytes, kind))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %entry.path, error = %e, "extraction task failed");
                String::new()
            }
        };

        batch.push(Prepared {
            entry,
            fingerprint,
            text,
        });
        if batch.len() >= config.index.batch_size {
            write_batch(writer, &mut batch, &mut summary).await?;
        }
    }

    write_batch(writer, &mut batch, &mut summary).await?;
    if total % config.index.progress_every != 0 {
        progress.report(ProgressEvent::Indexing { n: total, total });
    }

    summary.elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        candidates = summary.candidates,
        indexed = summary.indexed,
        skipped = summary.skipped,
        errors = summary.errors,
        empty = summary.empty,
        "reindex finished"
    );
    Ok(summary)
}

/// Write one batch of extracted documents in a single transaction. The
/// mapping is re-read inside it so the document being replaced is the one
/// currently live.
async fn write_batch(
    writer: &Writer,
    batch: &mut Vec<Prepared<'_>>,
    summary: &mut IndexRunSummary,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let mut tx = writer.begin().await?;
    for item in batch.iter() {
        let mapping = find_mapping(tx.conn(), item.entry.id).await?;
        replace_document(
            tx.conn(),
            item.entry,
            mapping.as_ref(),
            &item.fingerprint,
            &item.text,
        )
        .await?;
    }
    tx.commit().await?;

    for item in batch.drain(..) {
        summary.indexed += 1;
        if item.text.trim().is_empty() {
            debug!(path = %item.entry.path, "indexed with empty text");
            summary.empty += 1;
        }
    }
    Ok(())
}
