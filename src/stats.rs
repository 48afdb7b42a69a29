//! Catalog and index statistics.
//!
//! A quick summary of what is cataloged and indexed per root, so an
//! operator can tell whether scans and reindex runs are keeping up. Used
//! by `shelf stats`.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::error::Result;

/// Per-root breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct RootStats {
    pub root_id: i64,
    pub path: String,
    /// Cached by the last scan.
    pub files_count: Option<i64>,
    pub total_size_bytes: Option<i64>,
    pub last_scan_at: Option<i64>,
    /// Rows currently in the catalog.
    pub cataloged: i64,
    /// Cataloged files with a live index document.
    pub indexed: i64,
    /// Indexed files whose document has no text.
    pub empty: i64,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Vec<RootStats>> {
    let rows = sqlx::query(
        r#"
        SELECT
            r.id,
            r.path,
            r.files_count,
            r.total_size_bytes,
            r.last_scan_at,
            (SELECT COUNT(*) FROM files f WHERE f.root_id = r.id) AS cataloged,
            (SELECT COUNT(*) FROM files f JOIN index_map m ON m.file_id = f.id
                WHERE f.root_id = r.id AND m.doc_rowid IS NOT NULL) AS indexed,
            (SELECT COUNT(*) FROM files f
                JOIN index_map m ON m.file_id = f.id
                JOIN docs d ON d.rowid = m.doc_rowid
                WHERE f.root_id = r.id
                  AND length(trim(d.content, ' ' || char(9) || char(10) || char(13))) = 0) AS empty
        FROM roots r
        ORDER BY r.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RootStats {
            root_id: row.get("id"),
            path: row.get("path"),
            files_count: row.get("files_count"),
            total_size_bytes: row.get("total_size_bytes"),
            last_scan_at: row.get("last_scan_at"),
            cataloged: row.get("cataloged"),
            indexed: row.get("indexed"),
            empty: row.get("empty"),
        })
        .collect())
}

/// Print a summary of the database to stdout.
pub async fn run_stats(config: &Config, pool: &SqlitePool) -> Result<()> {
    let stats = collect_stats(pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let cataloged: i64 = stats.iter().map(|s| s.cataloged).sum();
    let indexed: i64 = stats.iter().map(|s| s.indexed).sum();
    let empty: i64 = stats.iter().map(|s| s.empty).sum();

    println!("shelf — Database Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Roots:       {}", stats.len());
    println!("  Cataloged:   {}", cataloged);
    println!(
        "  Indexed:     {} / {} ({}%)",
        indexed,
        cataloged,
        if cataloged > 0 {
            (indexed * 100) / cataloged
        } else {
            0
        }
    );
    println!("  Empty text:  {}", empty);

    if !stats.is_empty() {
        println!();
        println!("  By root:");
        println!(
            "  {:>4} {:<32} {:>8} {:>8} {:>6} {:>10}   {}",
            "ID", "PATH", "FILES", "INDEXED", "EMPTY", "SIZE", "LAST SCAN"
        );
        println!("  {}", "-".repeat(90));

        for s in &stats {
            let scan_display = match s.last_scan_at {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            let size = s
                .total_size_bytes
                .map(|b| format_bytes(b.max(0) as u64))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:>4} {:<32} {:>8} {:>8} {:>6} {:>10}   {}",
                s.root_id,
                truncate_left(&s.path, 32),
                s.cataloged,
                s.indexed,
                s.empty,
                size,
                scan_display
            );
        }
    }

    println!();
    Ok(())
}

/// Keep the tail of long paths, which is the part that tells roots apart.
fn truncate_left(s: &str, width: usize) -> String {
    let count = s.chars().count();
    if count <= width {
        return s.to_string();
    }
    let tail: String = s.chars().skip(count - (width - 1)).collect();
    format!("…{}", tail)
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_short(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_short(ts)
    }
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
