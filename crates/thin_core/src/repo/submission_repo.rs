//! Submission queries over SQLite.
//!
//! # Responsibility
//! - Provide the read paths for submissions: lazy per-form cursor, capped
//!   sample, lookup by form/instance, field pages and age counts.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - The page sort clause is only ever one of [`SortField`]'s identifiers;
//!   caller text is never spliced into SQL.
//! - A [`SubmissionCursor`] borrows its connection, so the connection
//!   cannot be returned to the pool while the cursor is alive.

use crate::db::ConnectionPool;
use crate::logging::log_statement;
use crate::model::submission::Submission;
use crate::record::engine::named_refs;
use crate::record::load_row;
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{Connection, Statement};
use serde::Serialize;

/// Row cap for [`SubmissionRepository::sample_for_form_id`].
pub const SAMPLE_LIMIT: i64 = 1000;

// Trailing space so that clauses can be appended.
const FOR_FORM_ID_SQL: &str = "SELECT * FROM submissions WHERE formId = :formId ";

const FIND_BY_INSTANCE_SQL: &str = "SELECT *
FROM submissions
WHERE formId = :formId
  AND instanceId = :instanceId
ORDER BY id
LIMIT 1";

const COUNTS_BY_AGE_SQL: &str = "SELECT
    CAST(payload_field(data, 'age') AS INTEGER) AS age,
    COUNT(*) AS count
FROM submissions
WHERE formId = :formId
GROUP BY age
ORDER BY age";

/// Allow-listed sort keys for [`SubmissionRepository::page_of_fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Id,
    Age,
    Kilograms,
    Year,
}

impl SortField {
    pub const ALL: [SortField; 4] = [Self::Id, Self::Age, Self::Kilograms, Self::Year];

    /// Resolves a caller-supplied name against the allow-list.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.column() == name)
    }

    /// Column alias used in the ORDER BY clause.
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Age => "age",
            Self::Kilograms => "kilograms",
            Self::Year => "year",
        }
    }
}

/// Projected numeric fields of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFields {
    pub id: i64,
    pub age: Option<i64>,
    pub kilograms: Option<i64>,
    pub year: Option<i64>,
}

/// Number of submissions sharing one `age` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeCount {
    pub age: Option<i64>,
    pub count: i64,
}

/// Validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub order: SortField,
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Validates raw paging input.
    ///
    /// # Errors
    /// - [`RepoError::InvalidArgument`] when `per_page < 0`, `page < 1`, the
    ///   offset overflows, or `sort_field` is not allow-listed.
    pub fn new(sort_field: Option<&str>, per_page: i64, page: i64) -> RepoResult<Self> {
        if per_page < 0 {
            return Err(RepoError::InvalidArgument(format!(
                "per_page must be >= 0, got {per_page}"
            )));
        }
        if page < 1 {
            return Err(RepoError::InvalidArgument(format!(
                "page must be >= 1, got {page}"
            )));
        }
        let order = match sort_field {
            None => SortField::Id,
            Some(name) => SortField::parse(name).ok_or_else(|| {
                RepoError::InvalidArgument(format!("unsupported sort field `{name}`"))
            })?,
        };
        let offset = per_page.checked_mul(page - 1).ok_or_else(|| {
            RepoError::InvalidArgument(format!("page {page} x {per_page} overflows"))
        })?;

        Ok(Self {
            order,
            limit: per_page,
            offset,
        })
    }
}

/// Lazy, row-at-a-time cursor over all submissions of one form.
///
/// Rows are fetched from SQLite as the iterator advances; nothing is
/// buffered. The cursor borrows the connection it was opened on, so the
/// connection outlives it by construction. Call [`close`](Self::close) to
/// finalize the statement and observe finalization errors; dropping the
/// cursor finalizes it silently.
pub struct SubmissionCursor<'conn> {
    stmt: Statement<'conn>,
    form_id: String,
}

impl<'conn> SubmissionCursor<'conn> {
    /// Prepares the per-form query on `conn`.
    pub fn open(conn: &'conn Connection, form_id: &str) -> RepoResult<Self> {
        let stmt = conn.prepare(FOR_FORM_ID_SQL)?;
        Ok(Self {
            stmt,
            form_id: form_id.to_string(),
        })
    }

    /// Runs the query and yields submissions in storage order.
    pub fn iter(&mut self) -> RepoResult<impl Iterator<Item = RepoResult<Submission>> + '_> {
        let params = form_params(&self.form_id);
        log_statement("repo", FOR_FORM_ID_SQL, &params);
        let rows = self
            .stmt
            .query_and_then(named_refs(&params).as_slice(), load_row::<Submission>)?;
        Ok(rows)
    }

    /// Finalizes the statement.
    pub fn close(self) -> RepoResult<()> {
        self.stmt.finalize()?;
        Ok(())
    }
}

/// Opens a lazy cursor over every submission of `form_id` on `conn`.
pub fn for_form_id<'conn>(
    conn: &'conn Connection,
    form_id: &str,
) -> RepoResult<SubmissionCursor<'conn>> {
    SubmissionCursor::open(conn, form_id)
}

/// Repository interface for submission reads.
pub trait SubmissionRepository {
    /// Up to [`SAMPLE_LIMIT`] submissions of a form, materialized.
    fn sample_for_form_id(&self, form_id: &str) -> RepoResult<Vec<Submission>>;
    /// One submission by identity, or `None`.
    fn find_by_form_and_instance(
        &self,
        form_id: &str,
        instance_id: &str,
    ) -> RepoResult<Option<Submission>>;
    /// One page of projected numeric fields.
    fn page_of_fields(
        &self,
        form_id: &str,
        sort_field: Option<&str>,
        per_page: i64,
        page: i64,
    ) -> RepoResult<Vec<SubmissionFields>>;
    /// Submission counts grouped by `age`.
    fn counts_by_age(&self, form_id: &str) -> RepoResult<Vec<AgeCount>>;
}

/// Repository over a caller-provided connection.
pub struct SqliteSubmissionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubmissionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SubmissionRepository for SqliteSubmissionRepository<'_> {
    fn sample_for_form_id(&self, form_id: &str) -> RepoResult<Vec<Submission>> {
        let sql = format!("{FOR_FORM_ID_SQL}LIMIT :limit");
        let mut params = form_params(form_id);
        params.push((":limit".to_string(), Value::Integer(SAMPLE_LIMIT)));
        log_statement("repo", &sql, &params);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_and_then(named_refs(&params).as_slice(), load_row::<Submission>)?;
        rows.collect()
    }

    fn find_by_form_and_instance(
        &self,
        form_id: &str,
        instance_id: &str,
    ) -> RepoResult<Option<Submission>> {
        let mut params = form_params(form_id);
        params.push((
            ":instanceId".to_string(),
            Value::Text(instance_id.to_string()),
        ));
        log_statement("repo", FIND_BY_INSTANCE_SQL, &params);

        let mut stmt = self.conn.prepare(FIND_BY_INSTANCE_SQL)?;
        let mut rows =
            stmt.query_and_then(named_refs(&params).as_slice(), load_row::<Submission>)?;
        rows.next().transpose()
    }

    fn page_of_fields(
        &self,
        form_id: &str,
        sort_field: Option<&str>,
        per_page: i64,
        page: i64,
    ) -> RepoResult<Vec<SubmissionFields>> {
        let window = PageWindow::new(sort_field, per_page, page)?;
        let sql = page_of_fields_sql(window.order);
        let mut params = form_params(form_id);
        params.push((":limit".to_string(), Value::Integer(window.limit)));
        params.push((":offset".to_string(), Value::Integer(window.offset)));
        log_statement("repo", &sql, &params);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(named_refs(&params).as_slice(), |row| {
            Ok(SubmissionFields {
                id: row.get("id")?,
                age: row.get("age")?,
                kilograms: row.get("kilograms")?,
                year: row.get("year")?,
            })
        })?;
        rows.map(|row| row.map_err(RepoError::from)).collect()
    }

    fn counts_by_age(&self, form_id: &str) -> RepoResult<Vec<AgeCount>> {
        let params = form_params(form_id);
        log_statement("repo", COUNTS_BY_AGE_SQL, &params);

        let mut stmt = self.conn.prepare(COUNTS_BY_AGE_SQL)?;
        let rows = stmt.query_map(named_refs(&params).as_slice(), |row| {
            Ok(AgeCount {
                age: row.get("age")?,
                count: row.get("count")?,
            })
        })?;
        rows.map(|row| row.map_err(RepoError::from)).collect()
    }
}

/// Repository that checks out its own pooled connection per call.
#[derive(Clone)]
pub struct PooledSubmissionRepository {
    pool: ConnectionPool,
}

impl PooledSubmissionRepository {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

impl SubmissionRepository for PooledSubmissionRepository {
    fn sample_for_form_id(&self, form_id: &str) -> RepoResult<Vec<Submission>> {
        let conn = self.pool.acquire()?;
        SqliteSubmissionRepository::new(&conn).sample_for_form_id(form_id)
    }

    fn find_by_form_and_instance(
        &self,
        form_id: &str,
        instance_id: &str,
    ) -> RepoResult<Option<Submission>> {
        let conn = self.pool.acquire()?;
        SqliteSubmissionRepository::new(&conn).find_by_form_and_instance(form_id, instance_id)
    }

    fn page_of_fields(
        &self,
        form_id: &str,
        sort_field: Option<&str>,
        per_page: i64,
        page: i64,
    ) -> RepoResult<Vec<SubmissionFields>> {
        // Reject bad input before taking a connection.
        PageWindow::new(sort_field, per_page, page)?;
        let conn = self.pool.acquire()?;
        SqliteSubmissionRepository::new(&conn).page_of_fields(form_id, sort_field, per_page, page)
    }

    fn counts_by_age(&self, form_id: &str) -> RepoResult<Vec<AgeCount>> {
        let conn = self.pool.acquire()?;
        SqliteSubmissionRepository::new(&conn).counts_by_age(form_id)
    }
}

fn page_of_fields_sql(order: SortField) -> String {
    format!(
        "SELECT
    id,
    CAST(payload_field(data, 'age') AS INTEGER) AS age,
    CAST(payload_field(data, 'kilograms') AS INTEGER) AS kilograms,
    CAST(payload_field(data, 'year') AS INTEGER) AS year
FROM submissions
WHERE formId = :formId
ORDER BY {} NULLS LAST, id
LIMIT :limit
OFFSET :offset",
        order.column()
    )
}

fn form_params(form_id: &str) -> Vec<(String, Value)> {
    vec![(":formId".to_string(), Value::Text(form_id.to_string()))]
}

#[cfg(test)]
mod tests {
    use super::{page_of_fields_sql, PageWindow, SortField};
    use crate::repo::RepoError;

    #[test]
    fn page_window_rejects_out_of_domain_input() {
        assert!(matches!(
            PageWindow::new(None, -1, 1),
            Err(RepoError::InvalidArgument(_))
        ));
        assert!(matches!(
            PageWindow::new(None, 10, 0),
            Err(RepoError::InvalidArgument(_))
        ));
        assert!(matches!(
            PageWindow::new(Some("not_a_real_field"), 10, 1),
            Err(RepoError::InvalidArgument(_))
        ));
        assert!(matches!(
            PageWindow::new(None, i64::MAX, 3),
            Err(RepoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn page_window_computes_offset_and_default_order() {
        let window = PageWindow::new(None, 0, 1).unwrap();
        assert_eq!(window.order, SortField::Id);
        assert_eq!(window.limit, 0);
        assert_eq!(window.offset, 0);

        let window = PageWindow::new(Some("kilograms"), 25, 3).unwrap();
        assert_eq!(window.order, SortField::Kilograms);
        assert_eq!(window.offset, 50);
    }

    #[test]
    fn sort_clause_uses_allow_listed_identifier_only() {
        let sql = page_of_fields_sql(SortField::Year);
        assert!(sql.contains("ORDER BY year NULLS LAST, id"));
        assert_eq!(SortField::parse("year; DROP TABLE submissions"), None);
        assert_eq!(SortField::parse("AGE"), None);
    }
}
