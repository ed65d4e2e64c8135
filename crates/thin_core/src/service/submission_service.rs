//! Submission use-case service.
//!
//! # Responsibility
//! - Provide create/update/read/export entry points for boundary callers.
//! - Classify failures as client-side (`Rejected`, `NotFound`, bad paging
//!   input) or server-side (`Store`).
//!
//! # Invariants
//! - Every call checks out its own pooled connection(s) and releases them
//!   before returning, on success and on every error path.
//! - Failed writes are reported once and never retried.

use crate::db::ConnectionPool;
use crate::export::csv::{CsvExporter, ExportSummary};
use crate::export::ExportError;
use crate::model::submission::Submission;
use crate::record::{try_save, SaveError};
use crate::repo::submission_repo::{
    for_form_id, AgeCount, PooledSubmissionRepository, SubmissionFields, SubmissionRepository,
};
use crate::repo::RepoError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;

/// Service error for submission use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// No submission with this form/instance pair.
    NotFound {
        form_id: String,
        instance_id: String,
    },
    /// The submission was refused because of its content.
    Rejected(SaveError),
    /// The store failed while persisting.
    Store(SaveError),
    /// Query failure or invalid query input.
    Repo(RepoError),
    /// CSV export failure.
    Export(ExportError),
}

impl ServiceError {
    /// Whether the caller, not the store, is at fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Rejected(_) => true,
            Self::Repo(RepoError::InvalidArgument(_)) => true,
            Self::Store(_) | Self::Repo(_) | Self::Export(_) => false,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound {
                form_id,
                instance_id,
            } => write!(f, "submission not found: {form_id}/{instance_id}"),
            Self::Rejected(err) => write!(f, "submission rejected: {err}"),
            Self::Store(err) => write!(f, "failed to save submission: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::Rejected(err) | Self::Store(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Export(err) => Some(err),
        }
    }
}

impl From<SaveError> for ServiceError {
    fn from(value: SaveError) -> Self {
        if value.is_client_error() {
            Self::Rejected(value)
        } else {
            Self::Store(value)
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ExportError> for ServiceError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

/// Submission facade over the connection pool.
pub struct SubmissionService {
    pool: ConnectionPool,
    repo: PooledSubmissionRepository,
}

impl SubmissionService {
    pub fn new(pool: ConnectionPool) -> Self {
        let repo = PooledSubmissionRepository::new(pool.clone());
        Self { pool, repo }
    }

    /// Creates a submission from a raw XML payload.
    ///
    /// The form and instance identifiers are taken from the document root.
    pub fn create(&self, raw: impl Into<String>) -> Result<Submission, ServiceError> {
        let mut submission = Submission::from_payload(raw);
        try_save(&self.pool, &mut submission)?;
        info!(
            "event=submission_create module=service status=ok form_id={} instance_id={}",
            submission.form_id().unwrap_or_default(),
            submission.instance_id().unwrap_or_default()
        );
        Ok(submission)
    }

    /// Replaces the payload of an existing submission.
    ///
    /// The new document must carry the same identity attributes.
    pub fn update(
        &self,
        form_id: &str,
        instance_id: &str,
        raw: impl Into<String>,
    ) -> Result<Submission, ServiceError> {
        let mut submission = self.require(form_id, instance_id)?;
        submission.set_data(raw);
        try_save(&self.pool, &mut submission)?;
        Ok(submission)
    }

    /// Looks up one submission; `None` when absent.
    pub fn get(&self, form_id: &str, instance_id: &str) -> Result<Option<Submission>, ServiceError> {
        Ok(self.repo.find_by_form_and_instance(form_id, instance_id)?)
    }

    /// Capped sample of a form's submissions.
    pub fn sample(&self, form_id: &str) -> Result<Vec<Submission>, ServiceError> {
        Ok(self.repo.sample_for_form_id(form_id)?)
    }

    /// One page of projected numeric fields.
    pub fn page(
        &self,
        form_id: &str,
        sort_field: Option<&str>,
        per_page: i64,
        page: i64,
    ) -> Result<Vec<SubmissionFields>, ServiceError> {
        Ok(self
            .repo
            .page_of_fields(form_id, sort_field, per_page, page)?)
    }

    /// Submission counts grouped by `age`.
    pub fn counts_by_age(&self, form_id: &str) -> Result<Vec<AgeCount>, ServiceError> {
        Ok(self.repo.counts_by_age(form_id)?)
    }

    /// Streams every submission of `form_id` to `out` as CSV.
    ///
    /// Holds one pooled connection for the duration of the export.
    pub fn export_csv<W: Write>(
        &self,
        form_id: &str,
        out: W,
    ) -> Result<ExportSummary, ServiceError> {
        let conn = self.pool.acquire().map_err(RepoError::from)?;
        let mut cursor = for_form_id(&conn, form_id)?;
        let summary = CsvExporter::new(out).export(cursor.iter()?)?;
        cursor.close()?;
        Ok(summary)
    }

    fn require(&self, form_id: &str, instance_id: &str) -> Result<Submission, ServiceError> {
        self.get(form_id, instance_id)?
            .ok_or_else(|| ServiceError::NotFound {
                form_id: form_id.to_string(),
                instance_id: instance_id.to_string(),
            })
    }
}
