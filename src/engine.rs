//! Shared entry point for scan, reindex, search and catalog reads.
//!
//! An [`Engine`] owns the connection pool, the configuration, the
//! permission lookup, and a registry of per-root locks. Within one process
//! a scan holds its root's lock for the whole run and a reindex holds the
//! locks of every root it may touch, taken in ascending id order. Runs on
//! different roots proceed side by side; their batch commits are
//! serialized through one shared [`Writer`]. Reads take no lock; WAL gives
//! them a consistent snapshot.
//!
//! Nothing coordinates separate processes sharing one database file
//! beyond SQLite's busy timeout: their batches commit last-writer-wins.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::access::{self, Caller, PermissionLookup, SqlitePermissions};
use crate::catalog::{self, FileQuery};
use crate::config::Config;
use crate::db::{self, Writer};
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::filter::Predicate;
use crate::get;
use crate::indexer::{self, ReindexOptions};
use crate::models::{CatalogEntry, FileDetail, IndexRunSummary, ScanSummary, SearchHit};
use crate::progress::{NoProgress, ProgressReporter};
use crate::roots;
use crate::scan;
use crate::search::{self, SearchRequest};

/// One async mutex per root id, created on first use.
#[derive(Default)]
pub struct RootLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl RootLocks {
    fn handle(&self, root_id: i64) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(root_id).or_default().clone()
    }

    pub async fn lock(&self, root_id: i64) -> OwnedMutexGuard<()> {
        self.handle(root_id).lock_owned().await
    }

    /// Lock several roots. Ids are sorted and deduplicated first so two
    /// callers can never wait on each other in opposite orders.
    pub async fn lock_all(&self, root_ids: &[i64]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = root_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock(id).await);
        }
        guards
    }

    pub fn try_lock(&self, root_id: i64) -> Option<OwnedMutexGuard<()>> {
        self.handle(root_id).try_lock_owned().ok()
    }
}

fn validate(config: &Config) -> Result<()> {
    config
        .validate()
        .map_err(|e| Error::Validation(format!("{:#}", e)))
}

pub struct Engine {
    pool: SqlitePool,
    writer: Writer,
    config: Arc<Config>,
    extractor: Extractor,
    locks: RootLocks,
    permissions: Arc<dyn PermissionLookup>,
    progress: Arc<dyn ProgressReporter>,
}

impl Engine {
    /// Wrap an open pool. The configuration is validated first. Grants come
    /// from the `root_permissions` table and progress is discarded until
    /// [`Engine::with_progress`] says otherwise.
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        validate(&config)?;
        let extractor = Extractor::new(&config.extraction);
        Ok(Self {
            permissions: Arc::new(SqlitePermissions::new(pool.clone())),
            writer: Writer::new(pool.clone()),
            pool,
            config: Arc::new(config),
            extractor,
            locks: RootLocks::default(),
            progress: Arc::new(NoProgress),
        })
    }

    /// Connect to the configured database. The schema must already exist.
    pub async fn open(config: Config) -> Result<Self> {
        validate(&config)?;
        let pool = db::connect(&config).await?;
        Self::new(pool, config)
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionLookup>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn locks(&self) -> &RootLocks {
        &self.locks
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Walk a root and reconcile the catalog with what is on disk.
    pub async fn scan(&self, root_id: i64, extensions: Option<&[String]>) -> Result<ScanSummary> {
        let root = roots::get_root(&self.pool, root_id).await?;
        scan::check_root_path(&root)?;
        let _guard = self.locks.lock(root_id).await;
        scan::scan_root(
            &self.writer,
            &self.config,
            self.progress.as_ref(),
            &root,
            extensions,
        )
        .await
    }

    /// Bring the full-text index up to date with the catalog.
    pub async fn reindex(&self, options: &ReindexOptions) -> Result<IndexRunSummary> {
        options.to_filter()?;
        let root_ids = match options.root_id {
            Some(id) => {
                roots::get_root(&self.pool, id).await?;
                vec![id]
            }
            None => roots::root_ids(&self.pool).await?,
        };
        let _guards = self.locks.lock_all(&root_ids).await;
        indexer::run_reindex(
            &self.writer,
            &self.config,
            &self.extractor,
            self.progress.as_ref(),
            options,
        )
        .await
    }

    /// Ranked full-text search. A blank query returns no hits.
    pub async fn search(&self, caller: &Caller, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        if request.is_blank() {
            return Ok(Vec::new());
        }
        let (mut filter, limit) = request.to_filter(&self.config.search)?;
        if let Some(scope) = self.scope(caller, request.root_id).await? {
            filter.push(scope);
        }
        search::search_files(&self.pool, &self.config, request, &filter, limit).await
    }

    /// Filtered page of the catalog, newest first.
    pub async fn list_files(&self, caller: &Caller, query: &FileQuery) -> Result<Vec<CatalogEntry>> {
        let (mut filter, limit, offset) = query.to_filter()?;
        if let Some(scope) = self.scope(caller, query.root_id).await? {
            filter.push(scope);
        }
        catalog::list_entries(&self.pool, &filter, limit, offset).await
    }

    /// Root predicate for a read. Permission is checked before existence,
    /// so a restricted caller learns nothing about roots it holds no grant on.
    async fn scope(&self, caller: &Caller, root_id: Option<i64>) -> Result<Option<Predicate>> {
        let scope = access::root_scope(self.permissions.as_ref(), caller, root_id).await?;
        if let Some(id) = root_id {
            roots::get_root(&self.pool, id).await?;
        }
        Ok(scope)
    }

    pub async fn get_file(&self, caller: &Caller, file_id: i64) -> Result<FileDetail> {
        get::get_file(&self.pool, self.permissions.as_ref(), caller, file_id).await
    }
}
