//! SQL scalar functions registered on every store connection.
//!
//! # Responsibility
//! - Let queries project fields out of the XML payload column, so sorting
//!   and aggregation over payload values stay inside SQL.
//!
//! # Invariants
//! - Functions are deterministic and never raise on malformed payloads;
//!   they return `NULL` instead.

use crate::model::payload::{FieldValue, ParsedPayload};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Name of the payload projection function: `payload_field(data, 'age')`.
pub const PAYLOAD_FIELD_FN: &str = "payload_field";

/// Registers all core scalar functions on `conn`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        PAYLOAD_FIELD_FN,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let payload = ctx.get::<Option<String>>(0)?;
            let field = ctx.get::<String>(1)?;
            Ok(payload.and_then(|raw| payload_field(&raw, &field)))
        },
    )
}

/// Text of a single-valued payload field, `None` for anything else.
pub fn payload_field(raw: &str, field: &str) -> Option<String> {
    match ParsedPayload::parse(raw).field_value(field) {
        FieldValue::Text(text) => Some(text.to_string()),
        FieldValue::Missing | FieldValue::Empty | FieldValue::RepeatGroup => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{payload_field, register_functions};
    use rusqlite::Connection;

    #[test]
    fn payload_field_extracts_single_text_values_only() {
        let raw = "<data><age>7</age><g><v>1</v><v>2</v></g></data>";
        assert_eq!(payload_field(raw, "age").as_deref(), Some("7"));
        assert_eq!(payload_field(raw, "g"), None);
        assert_eq!(payload_field("not xml", "age"), None);
    }

    #[test]
    fn registered_function_is_callable_from_sql() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let age: Option<i64> = conn
            .query_row(
                "SELECT CAST(payload_field(?1, 'age') AS INTEGER);",
                ["<data><age>42</age></data>"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(age, Some(42));

        let missing: Option<i64> = conn
            .query_row(
                "SELECT CAST(payload_field(NULL, 'age') AS INTEGER);",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(missing, None);
    }
}
