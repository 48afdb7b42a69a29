//! SQLite connection management.
//!
//! Every connection runs in WAL mode with foreign keys enforced. The
//! cascade from roots to files to index mappings depends on the latter,
//! so it is set explicitly rather than left to driver defaults. A busy
//! timeout lets writers from separate processes queue instead of failing
//! immediately.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::Config;
use crate::error::Result;

/// Create a connection pool to the configured SQLite database.
///
/// Creates the database file and its parent directories if they don't exist.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Serializes catalog writes within one process.
///
/// Every batch commit of a scan or reindex goes through one shared
/// [`Writer`]. A batch waits for the previous one to commit before it
/// opens its transaction, so two runs on different roots never race for
/// SQLite's write lock or hold a stale read snapshot into a write. Only
/// the writes of a batch happen inside the transaction; walking, reading
/// and extracting files happen before it is opened.
#[derive(Clone)]
pub struct Writer {
    pool: SqlitePool,
    lock: Arc<Mutex<()>>,
}

impl Writer {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for the write slot and open a transaction in it.
    pub async fn begin(&self) -> Result<WriteBatch> {
        let guard = self.lock.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteBatch { tx, _slot: guard })
    }
}

/// An open write transaction holding the process write slot. Dropping it
/// without [`WriteBatch::commit`] rolls the batch back.
pub struct WriteBatch {
    // Declared first: the transaction is rolled back before the slot frees.
    tx: Transaction<'static, Sqlite>,
    _slot: OwnedMutexGuard<()>,
}

impl WriteBatch {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<()> {
        let WriteBatch { tx, _slot } = self;
        tx.commit().await?;
        Ok(())
    }
}
