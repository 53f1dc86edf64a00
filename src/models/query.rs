//! Query-related data models.
//!
//! This module defines positional query parameters, the caller-selected
//! result shape, and the shaped results handed back by every client.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data, serialized as base64.
    ///
    /// Untagged deserialization tries `String` first, so JSON input never
    /// produces this variant; construct it directly to bind a BLOB.
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Parse a command-line argument.
    ///
    /// JSON scalars (`42`, `1.5`, `true`, `null`, `"quoted"`) keep their type;
    /// anything else is taken verbatim as a string.
    pub fn from_cli_arg(arg: &str) -> Self {
        match serde_json::from_str::<JsonValue>(arg) {
            Ok(JsonValue::Null) => Self::Null,
            Ok(JsonValue::Bool(b)) => Self::Bool(b),
            Ok(JsonValue::Number(n)) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            Ok(JsonValue::String(s)) => Self::String(s),
            _ => Self::String(arg.to_string()),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Shape of the data returned by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// One map per row, keyed by column name.
    #[default]
    Dict,
    /// Column names followed by the raw rows.
    List,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dict => "dict",
            Self::List => "list",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dict" => Ok(Self::Dict),
            "list" => Ok(Self::List),
            _ => Err(DbError::invalid_input(format!(
                "Invalid datatype '{}': expected 'dict' or 'list'",
                s
            ))),
        }
    }
}

/// Rows as the driver returned them, before shaping.
///
/// `columns` is empty whenever `rows` is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self { columns, rows }
    }
}

/// Result of a read, shaped per [`DataType`].
///
/// `Dict` serializes as an array of objects and `List` as the pair
/// `[columns, rows]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryData {
    Dict(Vec<serde_json::Map<String, JsonValue>>),
    List(Vec<String>, Vec<Vec<JsonValue>>),
}

impl QueryData {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Dict(rows) => rows.len(),
            Self::List(_, rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Dict(_) => DataType::Dict,
            Self::List(..) => DataType::List,
        }
    }

    /// Column names of a `List` result.
    pub fn columns(&self) -> Option<&[String]> {
        match self {
            Self::List(columns, _) => Some(columns),
            Self::Dict(_) => None,
        }
    }
}
