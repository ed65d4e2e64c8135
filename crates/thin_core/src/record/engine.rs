//! Descriptor-driven SQL synthesis and transactional writes.
//!
//! # Responsibility
//! - Build INSERT/UPDATE/SELECT-by-id statements from a [`TableDescriptor`].
//! - Execute writes inside a dedicated transaction and commit them.
//! - Implement the validate-then-persist `save` contract.
//!
//! # Invariants
//! - `save` never touches the store when the entity is invalid.
//! - INSERT never binds `id`; UPDATE never assigns `id`.
//! - The generated identity is assigned only after a successful commit.
//! - A failed statement leaves its transaction uncommitted (rolled back on
//!   drop) and is reported once, never retried.

use super::{Persistable, RecordError};
use crate::db::{ConnectionPool, DbError};
use crate::logging::log_statement;
use crate::model::table::{TableDescriptor, ID_COLUMN};
use crate::repo::RepoResult;
use log::warn;
use rusqlite::types::{ToSql, Value};
use rusqlite::{Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Successful write kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// New row created with this identity.
    Inserted(i64),
    /// Existing row updated.
    Updated,
}

/// Reason a save did not happen.
#[derive(Debug)]
pub enum SaveError {
    /// Entity failed its own validation; the store was not touched.
    ValidationFailed { table: String },
    /// Entity/descriptor mismatch. A programming error.
    Record(RecordError),
    /// The store rejected or could not execute the statement.
    Statement(rusqlite::Error),
    /// No connection could be obtained.
    Pool(DbError),
}

impl SaveError {
    /// Whether the failure is attributable to the submitted data rather than
    /// to the store.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::ValidationFailed { .. } => true,
            Self::Statement(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            Self::Record(_) | Self::Statement(_) | Self::Pool(_) => false,
        }
    }
}

impl Display for SaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValidationFailed { table } => write!(f, "invalid `{table}` record"),
            Self::Record(err) => write!(f, "{err}"),
            Self::Statement(err) => write!(f, "statement failed: {err}"),
            Self::Pool(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ValidationFailed { .. } => None,
            Self::Record(err) => Some(err),
            Self::Statement(err) => Some(err),
            Self::Pool(err) => Some(err),
        }
    }
}

impl From<RecordError> for SaveError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

impl From<rusqlite::Error> for SaveError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Statement(value)
    }
}

impl From<DbError> for SaveError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::Statement(err),
            other => Self::Pool(other),
        }
    }
}

/// `INSERT INTO <table> (<cols>) VALUES (:<cols>)`, `id` excluded.
pub fn insert_sql(table: &TableDescriptor) -> String {
    let columns: Vec<&str> = table.data_columns().collect();
    format!(
        "INSERT INTO {} ({}) VALUES (:{})",
        table.name(),
        columns.join(", "),
        columns.join(", :")
    )
}

/// `UPDATE <table> SET <col> = :<col>, ... WHERE id = :id`.
pub fn update_sql(table: &TableDescriptor) -> String {
    let assignments: Vec<String> = table
        .data_columns()
        .map(|column| format!("{column} = :{column}"))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {ID_COLUMN} = :{ID_COLUMN}",
        table.name(),
        assignments.join(", ")
    )
}

fn select_by_id_sql(table: &TableDescriptor) -> String {
    format!("SELECT * FROM {} WHERE {ID_COLUMN} = :{ID_COLUMN}", table.name())
}

/// Validates, then inserts or updates `entity` on a pooled connection.
///
/// The connection is acquired only after validation passes and is released
/// before returning.
pub fn try_save<E: Persistable>(
    pool: &ConnectionPool,
    entity: &mut E,
) -> Result<SaveOutcome, SaveError> {
    if !entity.is_valid() {
        return Err(SaveError::ValidationFailed {
            table: E::table().name().to_string(),
        });
    }

    let mut conn = pool.acquire()?;
    if entity.is_persisted() {
        update(&mut conn, entity).map(|()| SaveOutcome::Updated)
    } else {
        insert(&mut conn, entity).map(SaveOutcome::Inserted)
    }
}

/// Boolean form of [`try_save`]: `true` iff the statement committed.
pub fn save<E: Persistable>(pool: &ConnectionPool, entity: &mut E) -> bool {
    match try_save(pool, entity) {
        Ok(_) => true,
        Err(SaveError::ValidationFailed { .. }) => false,
        Err(err) => {
            warn!(
                "event=record_save module=record status=error table={} error={}",
                E::table().name(),
                err
            );
            false
        }
    }
}

/// Inserts `entity` in its own transaction and assigns the generated id.
///
/// Does not validate; callers normally go through [`try_save`].
pub fn insert<E: Persistable>(conn: &mut Connection, entity: &mut E) -> Result<i64, SaveError> {
    let table = E::table();
    let sql = insert_sql(table);
    let params = bind_values(entity, table.data_columns())?;

    let tx = conn.transaction()?;
    execute_logged(&tx, &sql, &params)?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    entity.set_id(id);
    Ok(id)
}

/// Updates the row identified by `entity.id()` in its own transaction.
///
/// Does not validate; callers normally go through [`try_save`].
pub fn update<E: Persistable>(conn: &mut Connection, entity: &E) -> Result<(), SaveError> {
    let table = E::table();
    let sql = update_sql(table);
    let params = bind_values(entity, table.column_names())?;

    let tx = conn.transaction()?;
    let changed = execute_logged(&tx, &sql, &params)?;
    tx.commit()?;

    if changed == 0 {
        warn!(
            "event=record_update module=record status=ok table={} rows_changed=0",
            table.name()
        );
    }
    Ok(())
}

/// Loads one entity by identity, hydrating every declared column.
pub fn find_by_id<E: Persistable + Default>(conn: &Connection, id: i64) -> RepoResult<Option<E>> {
    let table = E::table();
    let sql = select_by_id_sql(table);
    let params = vec![(format!(":{ID_COLUMN}"), Value::Integer(id))];
    log_statement("record", &sql, &params);

    let mut stmt = conn.prepare(&sql)?;
    let entity = stmt
        .query_and_then(named_refs(&params).as_slice(), load_row::<E>)?
        .next()
        .transpose()?;
    Ok(entity)
}

/// Builds an entity from a row containing every declared column.
pub fn load_row<E: Persistable + Default>(row: &Row<'_>) -> RepoResult<E> {
    let mut entity = E::default();
    for column in E::table().column_names() {
        let value: Value = row.get(column)?;
        entity.set_value(column, value)?;
    }
    Ok(entity)
}

fn bind_values<'a, E: Persistable>(
    entity: &E,
    columns: impl Iterator<Item = &'a str>,
) -> Result<Vec<(String, Value)>, RecordError> {
    columns
        .map(|column| Ok((format!(":{column}"), entity.value(column)?)))
        .collect()
}

pub(crate) fn named_refs(params: &[(String, Value)]) -> Vec<(&str, &dyn ToSql)> {
    params
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}

fn execute_logged(
    conn: &Connection,
    sql: &str,
    params: &[(String, Value)],
) -> Result<usize, SaveError> {
    log_statement("record", sql, params);
    conn.execute(sql, named_refs(params).as_slice())
        .map_err(|err| {
            warn!(
                "event=db_statement module=record status=error error={}",
                err
            );
            SaveError::Statement(err)
        })
}

#[cfg(test)]
mod tests {
    use super::{insert_sql, select_by_id_sql, update_sql};
    use crate::model::table::TableDescriptor;

    fn table() -> TableDescriptor {
        TableDescriptor::new("submissions", &["formId", "instanceId", "data"]).unwrap()
    }

    #[test]
    fn insert_sql_binds_every_column_but_id() {
        assert_eq!(
            insert_sql(&table()),
            "INSERT INTO submissions (formId, instanceId, data) VALUES (:formId, :instanceId, :data)"
        );
    }

    #[test]
    fn update_sql_never_assigns_id() {
        assert_eq!(
            update_sql(&table()),
            "UPDATE submissions SET formId = :formId, instanceId = :instanceId, data = :data WHERE id = :id"
        );
    }

    #[test]
    fn select_by_id_sql_filters_on_identity() {
        assert_eq!(
            select_by_id_sql(&table()),
            "SELECT * FROM submissions WHERE id = :id"
        );
    }
}
