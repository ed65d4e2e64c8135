//! SQLite storage bootstrap, migrations and connection pooling.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the submission store.
//! - Apply schema migrations in deterministic order.
//! - Hand out pooled connections with scoped release.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write submissions before migrations succeed.
//! - A pooled connection is used by one caller at a time and always
//!   returns to the pool (or closes) when its guard drops.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod functions;
pub mod migrations;
mod open;
pub mod pool;

pub use open::{open_db, open_db_in_memory};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The pool was shut down; no further connections are handed out.
    PoolClosed,
    /// No connection became available within the acquire timeout.
    PoolTimeout { waited_ms: u128 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::PoolClosed => write!(f, "connection pool is shut down"),
            Self::PoolTimeout { waited_ms } => write!(
                f,
                "timed out after {waited_ms}ms waiting for a pooled connection"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::PoolClosed | Self::PoolTimeout { .. } => {
                None
            }
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
