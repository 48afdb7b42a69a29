//! Full-text search over indexed files.
//!
//! The free-text query goes to FTS5 `MATCH` unchanged, so boolean
//! operators, phrases, `NEAR` and prefix queries work as FTS5 defines them.
//! Structured filters are AND'ed on through [`FileFilter`].
//!
//! Ranking is deliberately simple: a file whose name contains the project
//! term (exact, case-sensitive) scores `search.boost`, everything else
//! scores 0. Ties are broken by mtime (newest first), then catalog id.

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::catalog::size_filter;
use crate::config::{Config, SearchConfig};
use crate::error::{Error, Result};
use crate::filter::{day_end, day_start, normalize_extensions, FileFilter, Predicate};
use crate::models::{format_ts_iso, SearchHit};
use crate::roots::is_unc;

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// FTS5 query text.
    pub query: String,
    pub extensions: Option<Vec<String>>,
    pub root_id: Option<i64>,
    /// `YYYY-MM-DD`, from 00:00:00 UTC.
    pub since: Option<String>,
    /// `YYYY-MM-DD`, through 23:59:59 UTC.
    pub until: Option<String>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    /// File names containing this term are ranked first.
    pub project: Option<String>,
    pub limit: Option<i64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.query.trim().is_empty()
    }

    /// Validate the structured filters and the limit. Root scoping is not
    /// included; it depends on the caller.
    pub fn to_filter(&self, config: &SearchConfig) -> Result<(FileFilter, i64)> {
        let limit = self.limit.unwrap_or(config.default_limit);
        if !(1..=config.max_limit).contains(&limit) {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                config.max_limit
            )));
        }

        let mut filter = size_filter(self.min_size, self.max_size)?;

        let since = self.since.as_deref().map(|s| day_start(s, "since")).transpose()?;
        let until = self.until.as_deref().map(|s| day_end(s, "until")).transpose()?;
        if let (Some(from), Some(to)) = (since, until) {
            if from > to {
                return Err(Error::Validation("since must not be after until".into()));
            }
        }
        if let Some(from) = since {
            filter.push(Predicate::ModifiedFrom(from));
        }
        if let Some(to) = until {
            filter.push(Predicate::ModifiedUntil(to));
        }

        if let Some(exts) = &self.extensions {
            let exts = normalize_extensions(exts);
            if !exts.is_empty() {
                filter.push(Predicate::ExtIn(exts));
            }
        }

        Ok((filter, limit))
    }

    fn boost_term(&self) -> Option<&str> {
        self.project.as_deref().filter(|p| !p.is_empty())
    }
}

/// Assemble the search statement. Every user value is a bound parameter.
pub fn build_search_query<'a>(
    request: &'a SearchRequest,
    filter: &FileFilter,
    limit: i64,
    config: &'a SearchConfig,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT f.id, f.name, f.ext, f.path, f.size, f.mtime, snippet(docs, 0, ");
    qb.push_bind(config.highlight_open.as_str())
        .push(", ")
        .push_bind(config.highlight_close.as_str())
        .push(", ")
        .push_bind(config.ellipsis.as_str())
        .push(", ")
        .push_bind(config.snippet_tokens)
        .push(") AS snippet, ");

    match request.boost_term() {
        Some(term) => {
            qb.push("CASE WHEN instr(f.name, ")
                .push_bind(term)
                .push(") > 0 THEN ")
                .push_bind(config.boost)
                .push(" ELSE 0.0 END AS boost");
        }
        None => {
            qb.push("0.0 AS boost");
        }
    }

    qb.push(
        " FROM docs JOIN index_map m ON m.doc_rowid = docs.rowid \
         JOIN files f ON f.id = m.file_id WHERE docs MATCH ",
    )
    .push_bind(request.query.as_str());
    filter.push_conditions(&mut qb, "f");
    qb.push(" ORDER BY boost DESC, f.mtime DESC, f.id ASC LIMIT ")
        .push_bind(limit);
    qb
}

pub async fn search_files(
    pool: &SqlitePool,
    config: &Config,
    request: &SearchRequest,
    filter: &FileFilter,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    let mut qb = build_search_query(request, filter, limit, &config.search);
    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .map_err(|e| match query_syntax_error(&e) {
            Some(message) => Error::Validation(format!("bad search query: {}", message)),
            None => Error::Storage(e),
        })?;

    let hits = rows
        .iter()
        .map(|row| {
            let id: i64 = row.get("id");
            let path: String = row.get("path");
            let ext: Option<String> = row.get("ext");
            SearchHit {
                file_id: id,
                name: row.get("name"),
                ext: ext.unwrap_or_default(),
                file_link: file_link(&path),
                download_link: download_link(&config.links.download_base, id),
                path,
                size: row.get("size"),
                mtime: format_ts_iso(row.get("mtime")),
                score: row.get("boost"),
                snippet: row.get("snippet"),
            }
        })
        .collect();
    Ok(hits)
}

/// The FTS5 parser's complaint about the query text, if that is what
/// failed. Those are the caller's mistake, not a storage fault.
fn query_syntax_error(e: &sqlx::Error) -> Option<String> {
    let sqlx::Error::Database(db) = e else {
        return None;
    };
    let message = db.message();
    let is_query_error = message.starts_with("fts5:")
        || message.starts_with("unterminated string")
        || message.starts_with("no such column")
        || message.starts_with("unknown special query");
    is_query_error.then(|| message.to_string())
}

/// Print hits to stdout, best first.
pub fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.name);
        println!("    modified: {}", hit.mtime);
        println!("    path: {}", hit.path);
        println!("    link: {}", hit.file_link);
        println!("    download: {}", hit.download_link);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!("    id: {}", hit.file_id);
        println!();
    }
}

/// `file://` URI for a stored path. UNC paths keep their two leading
/// slashes after the authority: `\\srv\share\a.pdf` becomes
/// `file://///srv/share/a.pdf`.
pub fn file_link(path: &str) -> String {
    let p = path.replace('\\', "/");
    if is_unc(&p) {
        format!("file:///{}", p)
    } else if p.starts_with('/') {
        format!("file://{}", p)
    } else {
        format!("file:///{}", p)
    }
}

/// Download route for a catalog id; never derived from the path.
pub fn download_link(base: &str, file_id: i64) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file_id)
}
