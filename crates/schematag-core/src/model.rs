//! Parsed JSON Schema model.
//!
//! A `SchemaModel` is the intermediate form between a JSON Schema document
//! and the UDT definition built from it. Properties keep their declaration
//! order so generated member tags come out in the same order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// JSON Schema primitive type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    /// `string`
    #[default]
    String,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// `array`
    Array,
    /// `object`
    Object,
    /// `null`
    Null,
    /// Any type keyword this service does not know about
    #[serde(untagged)]
    Other(String),
}

impl JsonType {
    /// Parse a JSON Schema `type` keyword, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            "null" => Self::Null,
            _ => Self::Other(value.to_string()),
        }
    }

    /// The keyword as it appears in a schema.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
            Self::Other(value) => value,
        }
    }
}

impl std::fmt::Display for JsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default value declared on a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean default
    Bool(bool),
    /// Numeric default, kept exactly as written
    Number(serde_json::Number),
    /// String default, or the JSON text of a structured default
    Text(String),
}

impl From<&DefaultValue> for serde_json::Value {
    fn from(value: &DefaultValue) -> Self {
        match value {
            DefaultValue::Bool(b) => Self::Bool(*b),
            DefaultValue::Number(n) => Self::Number(n.clone()),
            DefaultValue::Text(s) => Self::String(s.clone()),
        }
    }
}

/// A single property of a JSON Schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Property name
    pub name: String,
    /// Declared type (`string` when absent)
    pub json_type: JsonType,
    /// `format` keyword, e.g. `date-time`
    pub format: Option<String>,
    /// `description` keyword
    pub description: Option<String>,
    /// `default` keyword
    pub default_value: Option<DefaultValue>,
    /// Target type name of a `$ref`
    pub ref_type: Option<String>,
    /// Inline properties of an object
    pub nested_properties: Vec<PropertyDefinition>,
    /// Item definition of an array
    pub items: Option<Box<PropertyDefinition>>,
    /// Allowed values of an `enum`
    pub enum_values: Option<Vec<String>>,
}

impl PropertyDefinition {
    /// Create a property with a name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, json_type: JsonType) -> Self {
        Self {
            name: name.into(),
            json_type,
            ..Self::default()
        }
    }

    /// Whether the property is an object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.json_type == JsonType::Object
    }

    /// Whether the property is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.json_type == JsonType::Array
    }

    /// Whether the property refers to another schema via `$ref`.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.ref_type.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Whether the property declares inline nested properties.
    #[must_use]
    pub fn has_nested_properties(&self) -> bool {
        !self.nested_properties.is_empty()
    }

    /// Whether the property is restricted to an enumeration.
    #[must_use]
    pub fn has_enum(&self) -> bool {
        self.enum_values.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// A parsed JSON Schema document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Type name, from `title` or the name the schema was published under
    pub name: String,
    /// `$id` keyword
    pub id: Option<String>,
    /// `description` keyword
    pub description: Option<String>,
    /// Base type referenced from `allOf`
    pub parent_type: Option<String>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDefinition>,
    /// Names listed in `required`
    pub required: BTreeSet<String>,
}

impl SchemaModel {
    /// Create an empty schema with a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a property.
    pub fn add_property(&mut self, property: PropertyDefinition) {
        self.properties.push(property);
    }

    /// Mark a property name as required.
    pub fn add_required(&mut self, name: impl Into<String>) {
        self.required.insert(name.into());
    }

    /// Whether a property name is required.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    /// Whether the schema extends a base type.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.parent_type.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl std::fmt::Display for SchemaModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} properties, {} required)",
            self.name,
            self.properties.len(),
            self.required.len()
        )
    }
}
