//! Core persistence and export logic for form submissions.
//! This crate is the single source of truth for submission invariants.

pub mod api;
pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod record;
pub mod repo;
pub mod service;

pub use api::{for_api_all, ApiRepresentable};
pub use config::{ConfigError, StoreConfig};
pub use db::{ConnectionPool, DbError, DbResult, PoolStatus, PooledConnection};
pub use export::csv::{escape_value, CsvExporter, ExportSummary, CSV_CONTENT_TYPE};
pub use export::{ExportError, ExportResult};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::payload::{FieldValue, ParsedPayload};
pub use model::submission::{Submission, SubmissionApi};
pub use model::table::{SchemaError, TableDescriptor};
pub use record::{
    find_by_id, save, try_save, Persistable, RecordError, RecordResult, SaveError, SaveOutcome,
};
pub use repo::submission_repo::{
    for_form_id, AgeCount, PageWindow, PooledSubmissionRepository, SortField,
    SqliteSubmissionRepository, SubmissionCursor, SubmissionFields, SubmissionRepository,
};
pub use repo::{RepoError, RepoResult};
pub use service::submission_service::{ServiceError, SubmissionService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
