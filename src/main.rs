//! # shelf CLI
//!
//! The `shelf` binary catalogs shared folders, keeps a full-text index of
//! their documents, and searches it.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and schema |
//! | `shelf root add\|list\|remove` | Manage crawl roots |
//! | `shelf grant` / `shelf revoke` / `shelf grants` | Manage per-root access grants |
//! | `shelf scan <root_id>` | Reconcile a root with the catalog |
//! | `shelf index` | Extract and index new or changed files |
//! | `shelf search "<query>"` | Full-text search with filters |
//! | `shelf files` | List cataloged files |
//! | `shelf get <file_id>` | Show one file and its indexed text |
//! | `shelf stats` | Per-root catalog and index counts |
//!
//! ## Examples
//!
//! ```bash
//! shelf init
//! shelf root add '\\fileserver\projects'
//! shelf scan 1 --ext pdf,docx,xlsx
//! shelf index --root 1
//! shelf search 'NEAR(budget forecast, 5)' --since 2024-01-01 --project ACME
//! shelf --as ana search contract --root 1 --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelf::access::{self, AccessLevel, Caller};
use shelf::catalog::FileQuery;
use shelf::config;
use shelf::filter::{day_end, day_start, parse_extension_list};
use shelf::get;
use shelf::indexer::ReindexOptions;
use shelf::migrate;
use shelf::models::format_ts_iso;
use shelf::progress::ProgressMode;
use shelf::roots;
use shelf::search::{self, SearchRequest};
use shelf::stats;
use shelf::Engine;

/// shelf: a file catalog with an incremental full-text index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Only `[db]` is required.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "shelf: catalog shared folders and search their documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    /// Act as this principal. Reads are limited to roots it has been
    /// granted; without it the caller is unrestricted.
    #[arg(long = "as", global = true, value_name = "PRINCIPAL")]
    principal: Option<String>,

    /// Log progress decisions at info level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage crawl roots.
    Root {
        #[command(subcommand)]
        action: RootAction,
    },

    /// Grant a principal access to a root (read, write or admin).
    Grant {
        root_id: i64,
        principal: String,
        level: String,
    },

    /// Remove a principal's grant on a root.
    Revoke { root_id: i64, principal: String },

    /// List the grants on a root.
    Grants {
        root_id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Walk a root and reconcile the catalog with what is on disk.
    Scan {
        root_id: i64,

        /// Only catalog these extensions, comma-separated (e.g. `pdf,docx`).
        #[arg(long)]
        ext: Option<String>,

        #[arg(long)]
        json: bool,

        /// Progress output on stderr. Defaults to human on a TTY, else off.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Extract text from new or changed files into the full-text index.
    Index {
        /// Only files under this root.
        #[arg(long)]
        root: Option<i64>,

        /// Only these extensions, comma-separated.
        #[arg(long)]
        ext: Option<String>,

        /// Consider at most this many files (newest first).
        #[arg(long)]
        limit: Option<i64>,

        /// Re-extract files even when unchanged.
        #[arg(long)]
        force: bool,

        #[arg(long)]
        json: bool,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Full-text search. The query uses FTS5 syntax: AND/OR/NOT,
    /// "quoted phrases", NEAR(a b, n), prefix*.
    Search {
        query: String,

        /// Extensions, comma-separated.
        #[arg(long)]
        ext: Option<String>,

        #[arg(long)]
        root: Option<i64>,

        /// Modified on or after this day (YYYY-MM-DD, UTC).
        #[arg(long)]
        since: Option<String>,

        /// Modified on or before this day (YYYY-MM-DD, UTC).
        #[arg(long)]
        until: Option<String>,

        #[arg(long)]
        min_size: Option<i64>,

        #[arg(long)]
        max_size: Option<i64>,

        /// Rank files whose name contains this term first.
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// List cataloged files, newest first.
    Files {
        #[arg(long)]
        root: Option<i64>,

        #[arg(long)]
        ext: Option<String>,

        #[arg(long)]
        min_size: Option<i64>,

        #[arg(long)]
        max_size: Option<i64>,

        #[arg(long)]
        since: Option<String>,

        #[arg(long)]
        until: Option<String>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// Show one cataloged file with its index state and text.
    Get {
        file_id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Per-root catalog and index counts.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RootAction {
    /// Register a directory (local or UNC) as a crawl root.
    Add { path: String },
    /// List registered roots.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a root with its catalog, index documents and grants.
    Remove { root_id: i64 },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Storage failures abort a scan or reindex after rolling back the open
/// batch; earlier batches stay committed.
fn run_error(e: shelf::Error) -> anyhow::Error {
    if e.is_fatal() {
        anyhow::Error::new(e).context("run aborted, uncommitted batch rolled back")
    } else {
        e.into()
    }
}

fn ext_list(raw: Option<String>) -> Option<Vec<String>> {
    raw.as_deref().and_then(parse_extension_list)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "shelf=info" } else { "shelf=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let caller = match &cli.principal {
        Some(p) => Caller::principal(p.trim()),
        None => Caller::unrestricted(),
    };
    let engine = Engine::open(cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Root { action } => match action {
            RootAction::Add { path } => {
                let root = roots::create_root(engine.pool(), &path).await?;
                println!("root {} added: {}", root.id, root.path);
            }
            RootAction::List { json } => {
                let all = roots::list_roots(engine.pool()).await?;
                if json {
                    print_json(&all)?;
                } else if all.is_empty() {
                    println!("No roots.");
                } else {
                    for r in &all {
                        let scanned = r
                            .last_scan_at
                            .map(format_ts_iso)
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "{:>4}  {}  files: {}  last scan: {}",
                            r.id,
                            r.path,
                            r.files_count.unwrap_or(0),
                            scanned
                        );
                    }
                }
            }
            RootAction::Remove { root_id } => {
                roots::delete_root(engine.pool(), root_id).await?;
                println!("root {} removed", root_id);
            }
        },
        Commands::Grant {
            root_id,
            principal,
            level,
        } => {
            let level: AccessLevel = level.parse()?;
            access::grant_access(engine.pool(), root_id, &principal, level).await?;
            println!("granted {} on root {} to {}", level, root_id, principal.trim());
        }
        Commands::Revoke { root_id, principal } => {
            if access::revoke_access(engine.pool(), root_id, &principal).await? {
                println!("revoked {} on root {}", principal.trim(), root_id);
            } else {
                println!("no grant for {} on root {}", principal.trim(), root_id);
            }
        }
        Commands::Grants { root_id, json } => {
            roots::get_root(engine.pool(), root_id).await?;
            let grants = access::list_grants(engine.pool(), root_id).await?;
            if json {
                print_json(&grants)?;
            } else if grants.is_empty() {
                println!("No grants on root {}.", root_id);
            } else {
                for g in &grants {
                    println!("{:<24} {}", g.principal, g.access_level);
                }
            }
        }
        Commands::Scan {
            root_id,
            ext,
            json,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let engine = engine.with_progress(mode.reporter());
            let exts = ext_list(ext);
            let summary = engine.scan(root_id, exts.as_deref()).await.map_err(run_error)?;
            if json {
                print_json(&summary)?;
            } else {
                println!("scan root {} ({})", summary.root_id, summary.root_path);
                println!("  candidates: {}", summary.candidates);
                println!("  inserted: {}", summary.inserted);
                println!("  updated: {}", summary.updated);
                println!("  skipped: {}", summary.skipped);
                println!("  errors: {}", summary.errors);
                println!(
                    "  files: {} ({})",
                    summary.files_count,
                    stats::format_bytes(summary.total_size_bytes.max(0) as u64)
                );
                println!("  elapsed: {:.2}s", summary.elapsed_secs);
                println!("ok");
            }
            engine.close().await;
            return Ok(());
        }
        Commands::Index {
            root,
            ext,
            limit,
            force,
            json,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let engine = engine.with_progress(mode.reporter());
            let options = ReindexOptions {
                root_id: root,
                extensions: ext_list(ext),
                limit,
                force,
            };
            let summary = engine.reindex(&options).await.map_err(run_error)?;
            if json {
                print_json(&summary)?;
            } else {
                println!("index");
                println!("  candidates: {}", summary.candidates);
                println!("  indexed: {}", summary.indexed);
                println!("  skipped: {}", summary.skipped);
                println!("  errors: {}", summary.errors);
                println!("  empty: {}", summary.empty);
                println!("  elapsed: {:.2}s", summary.elapsed_secs);
                println!("ok");
            }
            engine.close().await;
            return Ok(());
        }
        Commands::Search {
            query,
            ext,
            root,
            since,
            until,
            min_size,
            max_size,
            project,
            limit,
            json,
        } => {
            let request = SearchRequest {
                query,
                extensions: ext_list(ext),
                root_id: root,
                since,
                until,
                min_size,
                max_size,
                project,
                limit,
            };
            let hits = engine.search(&caller, &request).await?;
            if json {
                print_json(&hits)?;
            } else {
                search::print_hits(&hits);
            }
        }
        Commands::Files {
            root,
            ext,
            min_size,
            max_size,
            since,
            until,
            limit,
            offset,
            json,
        } => {
            let query = FileQuery {
                root_id: root,
                extensions: ext_list(ext),
                min_size,
                max_size,
                modified_from: since.as_deref().map(|s| day_start(s, "since")).transpose()?,
                modified_until: until.as_deref().map(|s| day_end(s, "until")).transpose()?,
                limit,
                offset,
            };
            let files = engine.list_files(&caller, &query).await?;
            if json {
                print_json(&files)?;
            } else if files.is_empty() {
                println!("No files.");
            } else {
                for f in &files {
                    println!(
                        "{:>6}  {}  {:>10}  {}",
                        f.id,
                        format_ts_iso(f.mtime),
                        stats::format_bytes(f.size.max(0) as u64),
                        f.path
                    );
                }
            }
        }
        Commands::Get { file_id, json } => {
            let detail = engine.get_file(&caller, file_id).await?;
            if json {
                print_json(&detail)?;
            } else {
                get::print_file_detail(&detail);
            }
        }
        Commands::Stats { json } => {
            if json {
                print_json(&stats::collect_stats(engine.pool()).await?)?;
            } else {
                stats::run_stats(engine.config(), engine.pool()).await?;
            }
        }
    }

    engine.close().await;
    Ok(())
}
