//! Read-side query layer and its error type.
//!
//! # Responsibility
//! - Define use-case oriented submission queries.
//! - Isolate SQLite query details from service/export orchestration.
//!
//! # Invariants
//! - Sort clauses are built only from allow-listed identifiers.
//! - A missing row is `Ok(None)`, never an error.

use crate::db::DbError;
use crate::record::RecordError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod submission_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for query and row hydration failures.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Record(RecordError),
    /// Caller-supplied query parameter outside its accepted domain.
    InvalidArgument(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Record(err) => write!(f, "{err}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Record(err) => Some(err),
            Self::InvalidArgument(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RecordError> for RepoError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
