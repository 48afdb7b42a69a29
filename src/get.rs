//! Single-file retrieval by catalog id.
//!
//! Returns the catalog entry, its index mapping, and the text currently in
//! the index. Used by `shelf get` and by [`crate::engine::Engine::get_file`].

use sqlx::SqlitePool;

use crate::access::{self, Caller, PermissionLookup};
use crate::catalog;
use crate::error::Result;
use crate::indexer::find_mapping;
use crate::models::{format_ts_iso, FileDetail};

/// Core get function returning structured data.
pub async fn get_file(
    pool: &SqlitePool,
    permissions: &dyn PermissionLookup,
    caller: &Caller,
    file_id: i64,
) -> Result<FileDetail> {
    let entry = catalog::get_entry(pool, file_id).await?;
    access::require_read(permissions, caller, entry.root_id).await?;

    let mut conn = pool.acquire().await?;
    let mapping = find_mapping(&mut *conn, file_id).await?;

    let content = match mapping.as_ref().and_then(|m| m.doc_rowid) {
        Some(rowid) => {
            sqlx::query_scalar("SELECT content FROM docs WHERE rowid = ?")
                .bind(rowid)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => None,
    };

    Ok(FileDetail {
        entry,
        mapping,
        content,
    })
}

/// Print a file detail to stdout.
pub fn print_file_detail(detail: &FileDetail) {
    let e = &detail.entry;
    println!("--- File ---");
    println!("id:           {}", e.id);
    println!("root_id:      {}", e.root_id);
    println!("name:         {}", e.name);
    println!("path:         {}", e.path);
    println!("ext:          {}", e.ext.as_deref().unwrap_or("(none)"));
    println!("size:         {}", e.size);
    println!("mtime:        {}", format_ts_iso(e.mtime));
    match &detail.mapping {
        Some(m) => {
            println!("fingerprint:  {}", m.fingerprint);
            match m.doc_rowid {
                Some(rowid) => println!("document:     {}", rowid),
                None => println!("document:     (none)"),
            }
        }
        None => println!("indexed:      no"),
    }
    println!();

    if let Some(text) = &detail.content {
        println!("--- Content ---");
        if text.trim().is_empty() {
            println!("(empty)");
        } else {
            println!("{}", text);
        }
        println!();
    }
}
