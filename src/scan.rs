//! Directory scanner: reconciles a root's files against the catalog.
//!
//! The walk is sorted by file name, so runs are reproducible. Each regular
//! file is a candidate. Candidates outside the extension allow-list are
//! skipped; the rest are stat'ed and inserted, updated, or left alone
//! depending on whether name, extension, size, or mtime changed.
//! Per-file stat failures and unreadable directory entries are counted
//! and the walk continues; storage failures abort the run and roll back
//! the open batch.
//!
//! Observed files are collected in batches of `scan.batch_size` while
//! walking. Each batch is reconciled in one short write transaction taken
//! from the shared [`Writer`], so the walk itself never holds SQLite's
//! write lock.
//!
//! Root statistics (`files_count`, `total_size_bytes`) are recomputed from
//! the files that passed the filter in this run and written in the final
//! commit together with `last_scan_at`.

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqliteConnection;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::catalog::{self, ObservedFile};
use crate::config::Config;
use crate::db::Writer;
use crate::error::{Error, Result};
use crate::filter::normalize_extensions;
use crate::models::{Root, ScanSummary};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::roots::is_unc;

/// Check that a root can be walked. UNC paths are accepted without an
/// existence check: the share may be briefly unreachable.
pub fn check_root_path(root: &Root) -> Result<()> {
    if root.path.trim().is_empty() {
        return Err(Error::Validation(format!("root {} has an empty path", root.id)));
    }
    if !is_unc(&root.path) && !Path::new(&root.path).exists() {
        return Err(Error::NotFound(format!(
            "root {} path does not exist: {}",
            root.id, root.path
        )));
    }
    Ok(())
}

pub async fn scan_root(
    writer: &Writer,
    config: &Config,
    progress: &dyn ProgressReporter,
    root: &Root,
    extensions: Option<&[String]>,
) -> Result<ScanSummary> {
    check_root_path(root)?;
    let started = Instant::now();

    let allowed = extensions.map(|exts| normalize_extensions(exts));
    let exclude = build_globset(&config.scan.exclude_globs)?;
    let root_path = Path::new(&root.path);

    let mut candidates = 0u64;
    let mut skipped = 0u64;
    let mut errors = 0u64;
    let mut files_count = 0i64;
    let mut total_size = 0i64;
    let mut counts = Reconciled::default();
    let mut batch: Vec<ObservedFile> = Vec::with_capacity(config.scan.batch_size);

    let walker = WalkDir::new(root_path)
        .follow_links(config.scan.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e, root_path, &exclude));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = root.id, error = %e, "unreadable directory entry");
                errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        candidates += 1;
        if candidates % config.scan.progress_every == 0 {
            progress.report(ProgressEvent::Scanning {
                root: root.path.clone(),
                seen: candidates,
            });
        }

        let ext = catalog::extension_of(entry.path());
        if let Some(allowed) = &allowed {
            if !ext.as_ref().is_some_and(|e| allowed.contains(e)) {
                skipped += 1;
                continue;
            }
        }

        let observed = match observe(&entry, ext) {
            Ok(observed) => observed,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot stat file");
                errors += 1;
                continue;
            }
        };
        files_count += 1;
        total_size += observed.size;
        batch.push(observed);

        if batch.len() >= config.scan.batch_size {
            let mut tx = writer.begin().await?;
            reconcile_batch(tx.conn(), root.id, &batch, &mut counts).await?;
            tx.commit().await?;
            batch.clear();
        }
    }

    let finished = Utc::now();
    let mut tx = writer.begin().await?;
    reconcile_batch(tx.conn(), root.id, &batch, &mut counts).await?;
    sqlx::query(
        "UPDATE roots SET last_scan_at = ?, files_count = ?, total_size_bytes = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(finished.timestamp())
    .bind(files_count)
    .bind(total_size)
    .bind(finished.timestamp())
    .bind(root.id)
    .execute(tx.conn())
    .await?;
    tx.commit().await?;

    let summary = ScanSummary {
        root_id: root.id,
        root_path: root.path.clone(),
        candidates,
        inserted: counts.inserted,
        updated: counts.updated,
        skipped: skipped + counts.unchanged,
        errors,
        total_size_bytes: total_size,
        files_count,
        elapsed_secs: started.elapsed().as_secs_f64(),
        last_scan_at: finished,
    };
    info!(
        root = root.id,
        candidates,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        errors,
        "scan finished"
    );
    Ok(summary)
}

#[derive(Default)]
struct Reconciled {
    inserted: u64,
    updated: u64,
    unchanged: u64,
}

/// Insert, update or leave alone each observed file of one batch.
async fn reconcile_batch(
    conn: &mut SqliteConnection,
    root_id: i64,
    files: &[ObservedFile],
    counts: &mut Reconciled,
) -> Result<()> {
    for observed in files {
        match catalog::find_entry(&mut *conn, root_id, &observed.path).await? {
            None => {
                catalog::upsert_entry(&mut *conn, root_id, observed).await?;
                counts.inserted += 1;
            }
            Some(existing) if observed.same_as(&existing) => {
                counts.unchanged += 1;
            }
            Some(existing) => {
                debug!(path = %observed.path, "metadata changed");
                catalog::update_entry(&mut *conn, existing.id, observed).await?;
                counts.updated += 1;
            }
        }
    }
    Ok(())
}

fn observe(entry: &DirEntry, ext: Option<String>) -> std::io::Result<ObservedFile> {
    let metadata = entry.metadata().map_err(std::io::Error::from)?;
    let modified = metadata.modified()?;
    let mtime = chrono::DateTime::<Utc>::from(modified).timestamp();

    Ok(ObservedFile {
        path: entry.path().to_string_lossy().into_owned(),
        name: entry.file_name().to_string_lossy().into_owned(),
        ext,
        size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
        mtime,
    })
}

fn is_excluded(entry: &DirEntry, root: &Path, exclude: &GlobSet) -> bool {
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    exclude.is_match(relative)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Validation(format!("bad exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Validation(format!("bad exclude globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_at(path: &str) -> Root {
        Root {
            id: 1,
            path: path.to_string(),
            last_scan_at: None,
            files_count: None,
            total_size_bytes: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn missing_local_root_is_not_found() {
        let err = check_root_path(&root_at("/definitely/not/here/shelf")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn unc_root_is_not_existence_checked() {
        assert!(check_root_path(&root_at(r"\\fileserver\projects")).is_ok());
    }

    #[test]
    fn blank_root_is_invalid() {
        assert!(matches!(
            check_root_path(&root_at("  ")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn exclude_globs_are_relative_to_root() {
        let set = build_globset(&["**/~$*".to_string(), "archive/**".to_string()]).unwrap();
        assert!(set.is_match(Path::new("team/~$draft.docx")));
        assert!(set.is_match(Path::new("archive/2019/a.pdf")));
        assert!(!set.is_match(Path::new("current/a.pdf")));
        assert!(build_globset(&["[".to_string()]).is_err());
    }
}
