//! # shroud-db
//!
//! SQLite persistence for a shielded pool.
//!
//! Each pool record lives in its own table, so a reader can inspect the
//! vault without decoding the nullifier registry. A snapshot is written in
//! one transaction and read back as a [`PoolSnapshot`], which the pool
//! audits before accepting.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Single-row tables carry `CHECK (id = 1)`
//! - Schema version stored in `PRAGMA user_version`
//!
//! ## Modules
//!
//! - [`schema`] — Table definitions
//! - [`migrations`] — Forward-only migrations
//! - [`queries`] — Per-record load/store functions
//! - [`snapshot`] — Whole-pool save and load

pub mod migrations;
pub mod queries;
pub mod schema;
pub mod snapshot;

use rusqlite::Connection;
use std::path::Path;

pub use shroud_pool::PoolSnapshot;
pub use snapshot::{load_snapshot, save_snapshot};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored rows do not form a valid record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the pool database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&mut conn)?;
    tracing::debug!(path = %path.display(), "pool database opened");
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = FULL;",
    )?;
    Ok(())
}

/// Convert a stored BLOB into a 32-byte value.
pub(crate) fn bytes32(blob: Vec<u8>, what: &str) -> Result<[u8; 32]> {
    <[u8; 32]>::try_from(blob.as_slice())
        .map_err(|_| DbError::Corrupt(format!("{what} is {} bytes, expected 32", blob.len())))
}
