//! JSON Schema to Ignition data type mapping.

use crate::model::JsonType;
use serde::{Deserialize, Serialize};

/// Ignition tag data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 8-bit integer
    Int1,
    /// 32-bit integer
    Int4,
    /// 64-bit integer
    Int8,
    /// 32-bit float
    Float4,
    /// 64-bit float
    Float8,
    /// Boolean
    Boolean,
    /// String
    String,
    /// Date and time
    DateTime,
    /// Tabular data
    DataSet,
}

impl DataType {
    /// Ignition name of the data type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int1 => "Int1",
            Self::Int4 => "Int4",
            Self::Int8 => "Int8",
            Self::Float4 => "Float4",
            Self::Float8 => "Float8",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::DataSet => "DataSet",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a JSON Schema type and optional format to an Ignition data type.
///
/// Returns `None` for `object`, which becomes a nested UDT instead of an
/// atomic tag. Unknown types fall back to `String`.
#[must_use]
pub fn map_to_ignition_type(json_type: Option<&JsonType>, format: Option<&str>) -> Option<DataType> {
    let Some(json_type) = json_type else {
        return Some(DataType::String);
    };

    match json_type {
        JsonType::String => Some(map_string_format(format)),
        JsonType::Integer => Some(DataType::Int4),
        JsonType::Number => Some(map_number_format(format)),
        JsonType::Boolean => Some(DataType::Boolean),
        JsonType::Array => Some(DataType::DataSet),
        JsonType::Object => None,
        JsonType::Null | JsonType::Other(_) => Some(DataType::String),
    }
}

fn map_string_format(format: Option<&str>) -> DataType {
    match format.map(str::to_ascii_lowercase).as_deref() {
        // Ignition has no separate date type
        Some("date-time" | "datetime" | "date") => DataType::DateTime,
        Some("byte") => DataType::Int1,
        // time, binary (base64) and everything else stay strings
        _ => DataType::String,
    }
}

fn map_number_format(format: Option<&str>) -> DataType {
    match format.map(str::to_ascii_lowercase).as_deref() {
        Some("float") => DataType::Float4,
        Some("int32" | "int") => DataType::Int4,
        Some("int64" | "long") => DataType::Int8,
        _ => DataType::Float8,
    }
}

/// Whether a JSON type becomes a nested UDT.
#[must_use]
pub fn is_nested_type(json_type: &JsonType) -> bool {
    *json_type == JsonType::Object
}

/// Whether a JSON type is an array.
#[must_use]
pub fn is_array_type(json_type: &JsonType) -> bool {
    *json_type == JsonType::Array
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(json_type: &str, format: Option<&str>) -> Option<DataType> {
        map_to_ignition_type(Some(&JsonType::parse(json_type)), format)
    }

    #[test]
    fn missing_type_is_string() {
        assert_eq!(map_to_ignition_type(None, None), Some(DataType::String));
    }

    #[test]
    fn string_formats() {
        assert_eq!(map("string", None), Some(DataType::String));
        assert_eq!(map("string", Some("date-time")), Some(DataType::DateTime));
        assert_eq!(map("string", Some("DateTime")), Some(DataType::DateTime));
        assert_eq!(map("string", Some("date")), Some(DataType::DateTime));
        assert_eq!(map("string", Some("time")), Some(DataType::String));
        assert_eq!(map("string", Some("byte")), Some(DataType::Int1));
        assert_eq!(map("string", Some("binary")), Some(DataType::String));
        assert_eq!(map("string", Some("email")), Some(DataType::String));
    }

    #[test]
    fn number_formats() {
        assert_eq!(map("number", None), Some(DataType::Float8));
        assert_eq!(map("number", Some("float")), Some(DataType::Float4));
        assert_eq!(map("number", Some("double")), Some(DataType::Float8));
        assert_eq!(map("number", Some("int32")), Some(DataType::Int4));
        assert_eq!(map("number", Some("long")), Some(DataType::Int8));
        assert_eq!(map("number", Some("decimal")), Some(DataType::Float8));
    }

    #[test]
    fn other_types() {
        assert_eq!(map("integer", Some("int64")), Some(DataType::Int4));
        assert_eq!(map("Boolean", None), Some(DataType::Boolean));
        assert_eq!(map("array", None), Some(DataType::DataSet));
        assert_eq!(map("object", None), None);
        assert_eq!(map("uuid", None), Some(DataType::String));
    }

    #[test]
    fn nested_and_array_predicates() {
        assert!(is_nested_type(&JsonType::parse("OBJECT")));
        assert!(!is_nested_type(&JsonType::Array));
        assert!(is_array_type(&JsonType::Array));
    }

    #[test]
    fn serializes_as_ignition_name() {
        assert_eq!(
            serde_json::to_value(DataType::Float8).unwrap(),
            serde_json::json!("Float8")
        );
        assert_eq!(DataType::DateTime.to_string(), "DateTime");
    }
}
