//! Tabular export of submissions.
//!
//! # Responsibility
//! - Turn a lazy stream of submissions into CSV bytes ([`csv`]).
//!
//! # Invariants
//! - Exporters consume their source incrementally and never collect it.

use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod csv;

pub type ExportResult<T> = Result<T, ExportError>;

/// Export failure: either the source or the sink broke.
#[derive(Debug)]
pub enum ExportError {
    /// Writing to the output failed.
    Io(std::io::Error),
    /// Fetching or hydrating a submission failed.
    Repo(RepoError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "export write failed: {err}"),
            Self::Repo(err) => write!(f, "export source failed: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RepoError> for ExportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}
