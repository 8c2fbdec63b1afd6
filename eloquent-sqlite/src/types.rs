//! Value conversion between the query layer and SQLite.

use eloquent_query::{DATETIME_FORMAT, Row, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Convert a bound value to a SQLite value.
///
/// Booleans become integers and date-times become text in
/// [`DATETIME_FORMAT`], which sorts and compares correctly as text.
pub fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::Json(j) => SqlValue::Text(j.to_string()),
    }
}

/// Convert a SQLite column value to a query-layer value.
///
/// Text always comes back as a string, byte for byte, so stored keys
/// compare equal to the values that were written.
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Read every column of a result row.
pub fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    columns
        .iter()
        .enumerate()
        .map(|(index, column)| Ok((column.clone(), from_sqlite(row.get_ref(index)?))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_to_sqlite_scalars() {
        assert!(matches!(to_sqlite(&Value::Null), SqlValue::Null));
        assert!(matches!(to_sqlite(&Value::Bool(true)), SqlValue::Integer(1)));
        assert!(matches!(to_sqlite(&Value::Bool(false)), SqlValue::Integer(0)));
        assert!(matches!(to_sqlite(&Value::Int(42)), SqlValue::Integer(42)));
        assert!(matches!(to_sqlite(&"hello".into()), SqlValue::Text(s) if s == "hello"));
    }

    #[test]
    fn test_to_sqlite_datetime() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 0, 250)
            .unwrap();
        let value = to_sqlite(&Value::DateTime(dt));
        assert!(matches!(value, SqlValue::Text(s) if s == "2024-03-01 12:30:00.250"));
    }

    #[test]
    fn test_from_sqlite() {
        assert_eq!(from_sqlite(ValueRef::Null), Value::Null);
        assert_eq!(from_sqlite(ValueRef::Integer(42)), Value::Int(42));
        assert_eq!(from_sqlite(ValueRef::Real(1.5)), Value::Float(1.5));
        assert_eq!(from_sqlite(ValueRef::Text(b"hello")), Value::String("hello".into()));
    }

    #[test]
    fn test_from_sqlite_keeps_json_looking_text() {
        assert_eq!(
            from_sqlite(ValueRef::Text(b"{\"key\": \"value\"}")),
            Value::String("{\"key\": \"value\"}".into())
        );
        assert_eq!(from_sqlite(ValueRef::Text(b"[1, 2]")), Value::String("[1, 2]".into()));
    }

    #[test]
    fn test_to_sqlite_json() {
        let value = to_sqlite(&Value::Json(serde_json::json!({"key": [1, 2]})));
        assert!(matches!(value, SqlValue::Text(s) if s == "{\"key\":[1,2]}"));
    }
}
