//! Table descriptor: the immutable schema fact for one entity type.
//!
//! # Responsibility
//! - Name the store-side table backing an entity.
//! - Hold the ordered set of writable column names used for SQL synthesis.
//!
//! # Invariants
//! - `columns` is unique and always contains [`ID_COLUMN`].
//! - `columns` has at least two members (id plus one data column).
//! - A descriptor is never mutated after construction, so it can be shared
//!   read-only across threads.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Name of the identity column every descriptor carries.
pub const ID_COLUMN: &str = "id";

/// Construction-time schema error. Always a programming error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Table name is empty or blank.
    EmptyTableName,
    /// Column set contains only the identity column.
    TooFewColumns { table: String },
    /// A declared column name is empty or blank.
    EmptyColumnName { table: String },
    /// A table or column name has leading or trailing whitespace.
    UntrimmedName { name: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTableName => write!(f, "invalid schema: table name cannot be empty"),
            Self::TooFewColumns { table } => write!(
                f,
                "invalid schema: table `{table}` must have more than one column"
            ),
            Self::EmptyColumnName { table } => write!(
                f,
                "invalid schema: table `{table}` declares an empty column name"
            ),
            Self::UntrimmedName { name } => write!(
                f,
                "invalid schema: name `{name}` has surrounding whitespace"
            ),
        }
    }
}

impl Error for SchemaError {}

/// Immutable name + column set for one persisted entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    columns: Vec<String>,
}

impl TableDescriptor {
    /// Creates a descriptor, implicitly adding the `id` column.
    ///
    /// Declared columns keep their order; duplicates are dropped. `id` is
    /// appended last unless it was declared explicitly.
    ///
    /// # Errors
    /// - [`SchemaError::EmptyTableName`] when `name` is blank.
    /// - [`SchemaError::EmptyColumnName`] when a declared column is blank.
    /// - [`SchemaError::UntrimmedName`] when a name has surrounding
    ///   whitespace; names are used verbatim in generated SQL.
    /// - [`SchemaError::TooFewColumns`] when only `id` remains.
    pub fn new(name: &str, columns: &[&str]) -> Result<Self, SchemaError> {
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        check_trimmed(name)?;

        let mut unique: Vec<String> = Vec::with_capacity(columns.len() + 1);
        for column in columns.iter().copied().chain(std::iter::once(ID_COLUMN)) {
            if column.trim().is_empty() {
                return Err(SchemaError::EmptyColumnName {
                    table: name.to_string(),
                });
            }
            check_trimmed(column)?;
            if !unique.iter().any(|existing| existing == column) {
                unique.push(column.to_string());
            }
        }

        if unique.len() < 2 {
            return Err(SchemaError::TooFewColumns {
                table: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            columns: unique,
        })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all column names, `id` included.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Returns the column names other than `id`, in declaration order.
    pub fn data_columns(&self) -> impl Iterator<Item = &str> {
        self.column_names().filter(|column| *column != ID_COLUMN)
    }

    /// Returns whether `column` is declared on this table.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|existing| existing == column)
    }

    /// Number of columns, `id` included.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always `false`: a valid descriptor has at least two columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn check_trimmed(name: &str) -> Result<(), SchemaError> {
    if name.trim() != name {
        return Err(SchemaError::UntrimmedName {
            name: name.to_string(),
        });
    }
    Ok(())
}
