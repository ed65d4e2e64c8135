//! Submission entity: one filled-in form instance.
//!
//! # Responsibility
//! - Hold the `formId`, `instanceId` and `data` columns of a submission.
//! - Own the parsed XML document derived from `data`.
//! - Cross-check the stored identity against the identity embedded in the
//!   document.
//!
//! # Invariants
//! - The parsed document is derived from `data` only; it cannot be set on
//!   its own.
//! - A valid submission has non-empty `formId`, `instanceId` and `data`,
//!   a well-formed document, and root attributes `id`/`instanceID` equal
//!   to the stored columns.

use crate::api::ApiRepresentable;
use crate::model::payload::ParsedPayload;
use crate::model::table::TableDescriptor;
use crate::record::{expect_text, text_value, Persistable, RecordError, RecordResult};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use serde::Serialize;

pub const SUBMISSIONS_TABLE: &str = "submissions";
pub const FORM_ID_COLUMN: &str = "formId";
pub const INSTANCE_ID_COLUMN: &str = "instanceId";
pub const DATA_COLUMN: &str = "data";

static TABLE: Lazy<TableDescriptor> = Lazy::new(|| {
    TableDescriptor::new(
        SUBMISSIONS_TABLE,
        &[FORM_ID_COLUMN, INSTANCE_ID_COLUMN, DATA_COLUMN],
    )
    .expect("valid submissions table descriptor")
});

/// Persisted form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    id: Option<i64>,
    form_id: Option<String>,
    instance_id: Option<String>,
    data: Option<String>,
    payload: ParsedPayload,
}

/// External projection of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionApi {
    pub form_id: Option<String>,
    pub instance_id: Option<String>,
    pub data: Option<String>,
}

impl Submission {
    /// Creates an empty, unsaved submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unsaved submission whose identity columns are copied from
    /// the document's root attributes.
    ///
    /// A malformed document leaves the identity columns empty, which makes
    /// the submission invalid.
    pub fn from_payload(raw: impl Into<String>) -> Self {
        let mut submission = Self::new();
        submission.set_data(raw);
        submission.form_id = submission.payload.form_id().map(str::to_string);
        submission.instance_id = submission.payload.instance_id().map(str::to_string);
        submission
    }

    pub fn form_id(&self) -> Option<&str> {
        self.form_id.as_deref()
    }

    pub fn set_form_id(&mut self, form_id: impl Into<String>) {
        self.form_id = Some(form_id.into());
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn set_instance_id(&mut self, instance_id: impl Into<String>) {
        self.instance_id = Some(instance_id.into());
    }

    /// Raw payload text.
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Replaces the payload and re-derives the parsed document.
    ///
    /// Never fails: malformed XML is recorded as
    /// [`ParsedPayload::Malformed`] and rejected later by validation.
    pub fn set_data(&mut self, raw: impl Into<String>) {
        let raw = raw.into();
        self.payload = ParsedPayload::parse(&raw);
        self.data = Some(raw);
    }

    /// Parsed document derived from `data`.
    pub fn payload(&self) -> &ParsedPayload {
        &self.payload
    }

    fn clear_data(&mut self) {
        self.data = None;
        self.payload = ParsedPayload::Absent;
    }
}

impl Persistable for Submission {
    fn table() -> &'static TableDescriptor {
        &TABLE
    }

    fn is_valid(&self) -> bool {
        let (Some(form_id), Some(instance_id), Some(data)) = (
            self.form_id.as_deref(),
            self.instance_id.as_deref(),
            self.data.as_deref(),
        ) else {
            return false;
        };
        if form_id.is_empty() || instance_id.is_empty() || data.is_empty() {
            return false;
        }

        self.payload.form_id() == Some(form_id) && self.payload.instance_id() == Some(instance_id)
    }

    fn read_column(&self, column: &str) -> Option<Value> {
        match column {
            FORM_ID_COLUMN => Some(text_value(self.form_id())),
            INSTANCE_ID_COLUMN => Some(text_value(self.instance_id())),
            DATA_COLUMN => Some(text_value(self.data())),
            _ => None,
        }
    }

    fn write_column(&mut self, column: &str, value: Value) -> RecordResult<()> {
        let table = Self::table();
        match column {
            FORM_ID_COLUMN => self.form_id = expect_text(table, column, value)?,
            INSTANCE_ID_COLUMN => self.instance_id = expect_text(table, column, value)?,
            DATA_COLUMN => match expect_text(table, column, value)? {
                Some(raw) => self.set_data(raw),
                None => self.clear_data(),
            },
            _ => {
                return Err(RecordError::UnknownColumn {
                    table: table.name().to_string(),
                    column: column.to_string(),
                })
            }
        }
        Ok(())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

impl ApiRepresentable for Submission {
    type Api = SubmissionApi;

    fn for_api(&self) -> SubmissionApi {
        SubmissionApi {
            form_id: self.form_id.clone(),
            instance_id: self.instance_id.clone(),
            data: self.data.clone(),
        }
    }
}
