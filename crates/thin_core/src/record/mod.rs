//! Generic record persistence shared by every stored entity.
//!
//! # Responsibility
//! - Define the [`Persistable`] capability concrete entities implement.
//! - Guard dynamic column access with the entity's table descriptor.
//! - Synthesize and execute INSERT/UPDATE statements (see [`engine`]).
//!
//! # Invariants
//! - Every column read/write goes through a name declared on the
//!   entity's [`TableDescriptor`]; anything else is [`RecordError::UnknownColumn`].
//! - An entity is persisted iff its `id` column is non-null.
//!
//! # See also
//! - [`crate::model::table`]

use crate::model::table::{TableDescriptor, ID_COLUMN};
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod engine;

pub use engine::{
    find_by_id, insert, insert_sql, load_row, save, try_save, update, update_sql, SaveError,
    SaveOutcome,
};

pub type RecordResult<T> = Result<T, RecordError>;

/// Programming errors raised by dynamic column access.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Column is not declared on the entity's table.
    UnknownColumn { table: String, column: String },
    /// Value type does not fit the typed field behind the column.
    InvalidColumnValue {
        table: String,
        column: String,
        expected: &'static str,
    },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column `{column}` on table `{table}`")
            }
            Self::InvalidColumnValue {
                table,
                column,
                expected,
            } => write!(f, "column `{table}.{column}` expects {expected}"),
        }
    }
}

impl Error for RecordError {}

/// Capability implemented by every persisted entity.
///
/// Implementors own strongly-typed fields and expose them by column name
/// through [`read_column`](Persistable::read_column) and
/// [`write_column`](Persistable::write_column). Callers should use the
/// checked [`value`](Persistable::value) / [`set_value`](Persistable::set_value)
/// wrappers, which enforce the descriptor before touching the entity.
pub trait Persistable: Sized {
    /// Schema fact for this entity type.
    fn table() -> &'static TableDescriptor;

    /// Entity-specific validation run before every write.
    fn is_valid(&self) -> bool;

    /// Raw typed read. Returns `None` when the entity has no such column.
    fn read_column(&self, column: &str) -> Option<Value>;

    /// Raw typed write for a declared column.
    fn write_column(&mut self, column: &str, value: Value) -> RecordResult<()>;

    /// Identity value, `None` while the entity is new.
    fn id(&self) -> Option<i64>;

    /// Assigns the store-generated identity.
    fn set_id(&mut self, id: i64);

    /// Returns whether the entity already has a row in the store.
    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }

    /// Checked column read.
    fn value(&self, column: &str) -> RecordResult<Value> {
        let table = Self::table();
        if !table.contains(column) {
            return Err(unknown_column(table, column));
        }
        if column == ID_COLUMN {
            return Ok(self.id().map_or(Value::Null, Value::Integer));
        }
        self.read_column(column)
            .ok_or_else(|| unknown_column(table, column))
    }

    /// Checked column write.
    fn set_value(&mut self, column: &str, value: Value) -> RecordResult<()> {
        let table = Self::table();
        if !table.contains(column) {
            return Err(unknown_column(table, column));
        }
        if column == ID_COLUMN {
            return match value {
                Value::Integer(id) => {
                    self.set_id(id);
                    Ok(())
                }
                _ => Err(RecordError::InvalidColumnValue {
                    table: table.name().to_string(),
                    column: column.to_string(),
                    expected: "an integer",
                }),
            };
        }
        self.write_column(column, value)
    }
}

fn unknown_column(table: &TableDescriptor, column: &str) -> RecordError {
    RecordError::UnknownColumn {
        table: table.name().to_string(),
        column: column.to_string(),
    }
}

/// Converts an optional text column into its store value.
pub fn text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

/// Reads a text column value, accepting `NULL` as `None`.
pub fn expect_text(
    table: &TableDescriptor,
    column: &str,
    value: Value,
) -> RecordResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        _ => Err(RecordError::InvalidColumnValue {
            table: table.name().to_string(),
            column: column.to_string(),
            expected: "text or null",
        }),
    }
}
