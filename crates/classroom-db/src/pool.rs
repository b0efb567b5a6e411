//! Connection pool creation and configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// The SQLite connection pool shared by every request handler of an app.
pub type DbPool = Pool<SqliteConnectionManager>;

/// A connection checked out of [`DbPool`]. Dropping it returns the
/// connection to the pool.
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The parent directory of the database file could not be created.
    #[error("failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),

    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Creates a pool over the SQLite file at `db_path`.
///
/// Every connection runs in WAL mode with foreign keys enforced and the
/// configured busy timeout. Missing parent directories are created.
///
/// # Errors
///
/// Returns `PoolError` if the directory or the pool cannot be created.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" instead of "wal".
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("failed to set WAL journal mode, got: {journal_mode}")),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    Ok(pool)
}
