//! Values, column metadata and the records produced by results.
use std::{fmt, sync::Arc};

use bincode::{Decode, Encode};

use crate::error::{Error, Result};

/// Type of a column as announced in a row stream header.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    UInt,
    Double,
    Text,
    Bytes,
    Json,
}

impl ColumnType {
    /// SQL spelling used when rendering table definitions.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Int => "BIGINT",
            ColumnType::UInt => "BIGINT UNSIGNED",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "TEXT",
            ColumnType::Bytes => "BLOB",
            ColumnType::Json => "JSON",
        }
    }
}

/// Column metadata. Fixed for the lifetime of the result that announced it.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// Mark the column as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A single field value.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Text(s) | Value::Json(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

/// One record of a row stream.
///
/// The column metadata is shared with the result that produced the row; the values are
/// owned, so a row stays valid after its result is closed or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// One record of a document stream: a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(serde_json::Value);

impl Document {
    /// Parses a document received from the wire.
    pub(crate) fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Protocol(format!("document is not valid JSON: {e}")))?;
        if !value.is_object() {
            return Err(Error::Protocol("document is not a JSON object".into()));
        }
        Ok(Self(value))
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// The `_id` field assigned by the server.
    pub fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(serde_json::Value::as_str)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Arc<[Column]> {
        vec![
            Column::new("name", ColumnType::Text),
            Column::new("age", ColumnType::Int).not_null(),
        ]
        .into()
    }

    #[test]
    fn row_lookup_by_name() {
        let row = Row::new(columns(), vec!["ada".into(), Value::Int(36)]);

        assert_eq!(row.len(), 2);
        assert_eq!(row.get_by_name("age"), Some(&Value::Int(36)));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get(0).and_then(Value::as_str), Some("ada"));
        assert!(!row.columns()[1].nullable);
    }

    #[test]
    fn row_display() {
        let row = Row::new(columns(), vec![Value::Null, Value::Int(1)]);
        assert_eq!(row.to_string(), "NULL | 1");
    }

    #[test]
    fn document_parse() {
        let doc = Document::parse(r#"{"_id": "0001", "name": "New Guy!"}"#).unwrap();
        assert_eq!(doc.id(), Some("0001"));
        assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("New Guy!"));
    }

    #[test]
    fn document_must_be_object() {
        assert!(matches!(Document::parse("[1, 2]"), Err(Error::Protocol(_))));
        assert!(matches!(Document::parse("{"), Err(Error::Protocol(_))));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::UInt(5).as_i64(), Some(5));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), None);
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(2.5).to_string(), "2.5");
    }
}
