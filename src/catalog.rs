//! The file catalog: one row per `(root, path)`.
//!
//! The scanner writes through [`find_entry`], [`upsert_entry`] and
//! [`update_entry`] inside its batch transaction; readers go through
//! [`list_entries`] and [`get_entry`]. Catalog rows are never deleted
//! here, only by the root cascade.

use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::path::Path;

use crate::error::{Error, Result};
use crate::filter::{FileFilter, Predicate};
use crate::models::CatalogEntry;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Metadata of a file as seen on disk during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFile {
    pub path: String,
    pub name: String,
    pub ext: Option<String>,
    pub size: i64,
    pub mtime: i64,
}

impl ObservedFile {
    /// Whether a stored entry already records exactly this metadata.
    pub fn same_as(&self, entry: &CatalogEntry) -> bool {
        self.name == entry.name
            && self.ext == entry.ext
            && self.size == entry.size
            && self.mtime == entry.mtime
    }
}

/// Lowercase extension with its leading dot, if the file name has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
}

const ENTRY_COLUMNS: &str = "id, root_id, path, name, ext, size, mtime, created_at, updated_at";

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> CatalogEntry {
    CatalogEntry {
        id: row.get("id"),
        root_id: row.get("root_id"),
        path: row.get("path"),
        name: row.get("name"),
        ext: row.get("ext"),
        size: row.get("size"),
        mtime: row.get("mtime"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn find_entry(
    conn: &mut SqliteConnection,
    root_id: i64,
    path: &str,
) -> Result<Option<CatalogEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM files WHERE root_id = ? AND path = ?",
        ENTRY_COLUMNS
    ))
    .bind(root_id)
    .bind(path)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(row_to_entry))
}

/// Insert a file, or update the existing row for the same `(root, path)`.
/// Returns the catalog id.
pub async fn upsert_entry(
    conn: &mut SqliteConnection,
    root_id: i64,
    file: &ObservedFile,
) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO files (root_id, path, name, ext, size, mtime, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(root_id, path) DO UPDATE SET
            name = excluded.name,
            ext = excluded.ext,
            size = excluded.size,
            mtime = excluded.mtime,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(root_id)
    .bind(&file.path)
    .bind(&file.name)
    .bind(&file.ext)
    .bind(file.size)
    .bind(file.mtime)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn update_entry(conn: &mut SqliteConnection, id: i64, file: &ObservedFile) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "UPDATE files SET name = ?, ext = ?, size = ?, mtime = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&file.name)
    .bind(&file.ext)
    .bind(file.size)
    .bind(file.mtime)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_entry(pool: &SqlitePool, id: i64) -> Result<CatalogEntry> {
    let row = sqlx::query(&format!("SELECT {} FROM files WHERE id = ?", ENTRY_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref()
        .map(row_to_entry)
        .ok_or_else(|| Error::NotFound(format!("file {}", id)))
}

/// Filtered page of the catalog, newest first (mtime desc, id asc).
pub async fn list_entries(
    pool: &SqlitePool,
    filter: &FileFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<CatalogEntry>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM files f WHERE 1=1",
        ENTRY_COLUMNS
            .split(", ")
            .map(|c| format!("f.{}", c))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    filter.push_conditions(&mut qb, "f");
    qb.push(" ORDER BY f.mtime DESC, f.id ASC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_entry).collect())
}

/// Catalog listing request.
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    pub root_id: Option<i64>,
    pub extensions: Option<Vec<String>>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    /// Epoch seconds, inclusive.
    pub modified_from: Option<i64>,
    /// Epoch seconds, inclusive.
    pub modified_until: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FileQuery {
    /// Validate the paging values and build the non-root part of the filter.
    pub fn to_filter(&self) -> Result<(FileFilter, i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::Validation("offset must be >= 0".into()));
        }

        let mut filter = size_filter(self.min_size, self.max_size)?;
        if let (Some(from), Some(until)) = (self.modified_from, self.modified_until) {
            if from > until {
                return Err(Error::Validation(
                    "modified_from must not be after modified_until".into(),
                ));
            }
        }
        if let Some(exts) = &self.extensions {
            filter.push(Predicate::ExtIn(crate::filter::normalize_extensions(exts)));
        }
        if let Some(from) = self.modified_from {
            filter.push(Predicate::ModifiedFrom(from));
        }
        if let Some(until) = self.modified_until {
            filter.push(Predicate::ModifiedUntil(until));
        }
        Ok((filter, limit, offset))
    }
}

/// Size range predicates, rejecting negative or inverted bounds.
pub fn size_filter(min_size: Option<i64>, max_size: Option<i64>) -> Result<FileFilter> {
    let mut filter = FileFilter::new();
    if min_size.is_some_and(|n| n < 0) || max_size.is_some_and(|n| n < 0) {
        return Err(Error::Validation("sizes must be >= 0".into()));
    }
    if let (Some(min), Some(max)) = (min_size, max_size) {
        if min > max {
            return Err(Error::Validation("min_size must not exceed max_size".into()));
        }
    }
    if let Some(min) = min_size {
        filter.push(Predicate::SizeAtLeast(min));
    }
    if let Some(max) = max_size {
        filter.push(Predicate::SizeAtMost(max));
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercase_with_dot() {
        assert_eq!(extension_of(Path::new("/a/Report.PDF")), Some(".pdf".into()));
        assert_eq!(extension_of(Path::new("/a/archive.tar.gz")), Some(".gz".into()));
        assert_eq!(extension_of(Path::new("/a/Makefile")), None);
        assert_eq!(extension_of(Path::new("/a/.bashrc")), None);
    }

    #[test]
    fn same_as_compares_the_four_fields() {
        let entry = CatalogEntry {
            id: 1,
            root_id: 1,
            path: "/r/a.txt".into(),
            name: "a.txt".into(),
            ext: Some(".txt".into()),
            size: 5,
            mtime: 100,
            created_at: 0,
            updated_at: 0,
        };
        let mut seen = ObservedFile {
            path: "/r/a.txt".into(),
            name: "a.txt".into(),
            ext: Some(".txt".into()),
            size: 5,
            mtime: 100,
        };
        assert!(seen.same_as(&entry));
        seen.mtime = 101;
        assert!(!seen.same_as(&entry));
    }

    #[test]
    fn listing_limits_are_checked() {
        let q = FileQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert!(matches!(q.to_filter(), Err(Error::Validation(_))));
        let q = FileQuery {
            limit: Some(1001),
            ..Default::default()
        };
        assert!(q.to_filter().is_err());
        let q = FileQuery {
            offset: Some(-1),
            ..Default::default()
        };
        assert!(q.to_filter().is_err());
        let (_, limit, offset) = FileQuery::default().to_filter().unwrap();
        assert_eq!((limit, offset), (100, 0));
    }

    #[test]
    fn inverted_size_range_is_rejected() {
        assert!(size_filter(Some(10), Some(5)).is_err());
        assert!(size_filter(Some(-1), None).is_err());
        assert_eq!(size_filter(Some(5), Some(5)).unwrap().predicates().len(), 2);
    }
}
