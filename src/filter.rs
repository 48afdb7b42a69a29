//! Structured catalog filters.
//!
//! A [`FileFilter`] is a conjunction of [`Predicate`]s over the `files`
//! table. It compiles onto an [`sqlx::QueryBuilder`] as `AND ...` clauses
//! with every value bound as a parameter, so the same filter drives
//! catalog listing, indexer candidate selection, and search, and can be
//! tested without a full-text query attached.

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{Error, Result};

/// One condition on a catalog row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Extension is one of these (normalized, with leading dot).
    ExtIn(Vec<String>),
    RootIs(i64),
    /// Root is one of these. An empty set matches nothing.
    RootIn(Vec<i64>),
    SizeAtLeast(i64),
    SizeAtMost(i64),
    /// mtime >= epoch seconds.
    ModifiedFrom(i64),
    /// mtime <= epoch seconds.
    ModifiedUntil(i64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFilter {
    predicates: Vec<Predicate>,
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Append one ` AND <condition>` per predicate. Columns are qualified
    /// with `alias` (the name the query gives the `files` table).
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        for predicate in &self.predicates {
            qb.push(" AND ");
            match predicate {
                Predicate::ExtIn(exts) => {
                    if exts.is_empty() {
                        qb.push("0");
                        continue;
                    }
                    qb.push(format!("{}.ext IN (", alias));
                    let mut list = qb.separated(", ");
                    for ext in exts {
                        list.push_bind(ext.clone());
                    }
                    list.push_unseparated(")");
                }
                Predicate::RootIs(id) => {
                    qb.push(format!("{}.root_id = ", alias)).push_bind(*id);
                }
                Predicate::RootIn(ids) => {
                    if ids.is_empty() {
                        qb.push("0");
                        continue;
                    }
                    qb.push(format!("{}.root_id IN (", alias));
                    let mut list = qb.separated(", ");
                    for id in ids {
                        list.push_bind(*id);
                    }
                    list.push_unseparated(")");
                }
                Predicate::SizeAtLeast(n) => {
                    qb.push(format!("{}.size >= ", alias)).push_bind(*n);
                }
                Predicate::SizeAtMost(n) => {
                    qb.push(format!("{}.size <= ", alias)).push_bind(*n);
                }
                Predicate::ModifiedFrom(ts) => {
                    qb.push(format!("{}.mtime >= ", alias)).push_bind(*ts);
                }
                Predicate::ModifiedUntil(ts) => {
                    qb.push(format!("{}.mtime <= ", alias)).push_bind(*ts);
                }
            }
        }
    }
}

/// Normalize an extension list: trimmed, lowercase, leading dot, no
/// blanks, no duplicates, input order kept.
pub fn normalize_extensions<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let e = item.as_ref().trim().to_lowercase();
        if e.is_empty() || e == "." {
            continue;
        }
        let e = if e.starts_with('.') { e } else { format!(".{}", e) };
        if !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

/// Parse a comma-separated extension list such as `"pdf, .DOCX,txt"`.
/// Returns `None` when nothing usable is left.
pub fn parse_extension_list(raw: &str) -> Option<Vec<String>> {
    let exts = normalize_extensions(raw.split(','));
    if exts.is_empty() {
        None
    } else {
        Some(exts)
    }
}

fn parse_day(raw: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        Error::Validation(format!("{} must be a YYYY-MM-DD date, got '{}'", field, raw))
    })
}

/// First second (UTC) of the given `YYYY-MM-DD` day.
pub fn day_start(raw: &str, field: &str) -> Result<i64> {
    let date = parse_day(raw, field)?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| Error::Validation(format!("{} is out of range", field)))
}

/// Last second (UTC) of the given `YYYY-MM-DD` day.
pub fn day_end(raw: &str, field: &str) -> Result<i64> {
    let date = parse_day(raw, field)?;
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| Error::Validation(format!("{} is out of range", field)))
}
