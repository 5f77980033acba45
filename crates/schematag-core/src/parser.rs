//! JSON Schema parser.
//!
//! Only the subset of JSON Schema that maps onto tag types is read:
//! `title`, `$id`, `description`, `required`, `properties`, `allOf`, `$ref`,
//! `type`, `format`, `default`, `enum` and `items`. Everything else is ignored.

use crate::model::{DefaultValue, JsonType, PropertyDefinition, SchemaModel};
use serde_json::{Map, Value};

/// Parse JSON Schema text into a `SchemaModel`.
///
/// `default_name` is used when the schema has no `title`; it is normally the
/// name the schema was published or cached under.
///
/// # Errors
///
/// Returns error if the text is not JSON, the root is not an object, or a
/// property definition has the wrong shape.
pub fn parse_schema(default_name: &str, json: &str) -> Result<SchemaModel, ParseError> {
    let root: Value = serde_json::from_str(json).map_err(|e| ParseError::Json {
        schema: default_name.to_string(),
        message: e.to_string(),
    })?;

    let Value::Object(root) = root else {
        return Err(ParseError::NotAnObject(default_name.to_string()));
    };

    let schema = parse_root(default_name, &root)?;
    tracing::debug!(schema = %schema, "Parsed schema");
    Ok(schema)
}

fn parse_root(default_name: &str, root: &Map<String, Value>) -> Result<SchemaModel, ParseError> {
    let name = string_field(root, "title")?.unwrap_or_else(|| default_name.to_string());
    let mut schema = SchemaModel::new(name);
    schema.id = string_field(root, "$id")?;
    schema.description = string_field(root, "description")?;

    add_required(&mut schema, root)?;

    if let Some(Value::Object(properties)) = root.get("properties") {
        for (name, definition) in properties {
            schema.add_property(parse_property(name, definition)?);
        }
    }

    if let Some(Value::Array(all_of)) = root.get("allOf") {
        for part in all_of {
            let Value::Object(part) = part else {
                return Err(ParseError::InvalidShape {
                    field: "allOf".to_string(),
                    expected: "object",
                });
            };

            if let Some(reference) = string_field(part, "$ref")? {
                schema.parent_type = Some(ref_name(&reference));
            }

            if let Some(Value::Object(properties)) = part.get("properties") {
                for (name, definition) in properties {
                    schema.add_property(parse_property(name, definition)?);
                }
            }

            add_required(&mut schema, part)?;
        }
    }

    Ok(schema)
}

fn add_required(schema: &mut SchemaModel, object: &Map<String, Value>) -> Result<(), ParseError> {
    if let Some(Value::Array(required)) = object.get("required") {
        for entry in required {
            let name = primitive_string(entry).ok_or_else(|| ParseError::InvalidShape {
                field: "required".to_string(),
                expected: "string",
            })?;
            schema.add_required(name);
        }
    }
    Ok(())
}

fn parse_property(name: &str, definition: &Value) -> Result<PropertyDefinition, ParseError> {
    let Value::Object(definition) = definition else {
        return Err(ParseError::InvalidShape {
            field: name.to_string(),
            expected: "object",
        });
    };

    // A reference carries no other information we use.
    if let Some(reference) = string_field(definition, "$ref")? {
        let mut property = PropertyDefinition::new(name, JsonType::Object);
        property.ref_type = Some(ref_name(&reference));
        return Ok(property);
    }

    let json_type = match definition.get("type") {
        None => JsonType::String,
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(primitive_string)
            .map(|t| JsonType::parse(&t))
            .find(|t| *t != JsonType::Null)
            .unwrap_or(JsonType::String),
        Some(value) => {
            JsonType::parse(&primitive_string(value).ok_or_else(|| ParseError::InvalidShape {
                field: format!("{name}.type"),
                expected: "string",
            })?)
        }
    };

    let mut property = PropertyDefinition::new(name, json_type);
    property.format = string_field(definition, "format")?;
    property.description = string_field(definition, "description")?;
    property.default_value = definition.get("default").and_then(default_value);

    if let Some(Value::Array(values)) = definition.get("enum") {
        property.enum_values = Some(values.iter().filter_map(primitive_string).collect());
    }

    if property.is_object() {
        if let Some(Value::Object(nested)) = definition.get("properties") {
            for (nested_name, nested_definition) in nested {
                property
                    .nested_properties
                    .push(parse_property(nested_name, nested_definition)?);
            }
        }
    }

    if property.is_array() {
        if let Some(items) = definition.get("items") {
            property.items = Some(Box::new(parse_property("items", items)?));
        }
    }

    Ok(property)
}

/// Extract the type name from a `$ref`.
///
/// `#/definitions/Address` becomes `Address` and
/// `https://example.com/schemas/base.json` becomes `base`. A reference without
/// any `/` is returned unchanged.
#[must_use]
pub fn ref_name(reference: &str) -> String {
    if !reference.contains('/') {
        return reference.to_string();
    }
    let last = reference.rsplit('/').next().unwrap_or(reference);
    last.strip_suffix(".json").unwrap_or(last).to_string()
}

fn default_value(value: &Value) -> Option<DefaultValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(DefaultValue::Bool(*b)),
        Value::Number(n) => Some(DefaultValue::Number(n.clone())),
        Value::String(s) => Some(DefaultValue::Text(s.clone())),
        other => Some(DefaultValue::Text(other.to_string())),
    }
}

fn primitive_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(object: &Map<String, Value>, field: &str) -> Result<Option<String>, ParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => primitive_string(value)
            .map(Some)
            .ok_or_else(|| ParseError::InvalidShape {
                field: field.to_string(),
                expected: "string",
            }),
    }
}

/// Errors that can occur parsing a JSON Schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The text is not valid JSON
    #[error("failed to parse JSON Schema {schema}: {message}")]
    Json {
        /// Name the schema was submitted under
        schema: String,
        /// Underlying JSON error
        message: String,
    },
    /// The document root is not a JSON object
    #[error("JSON Schema {0} is not an object")]
    NotAnObject(String),
    /// A keyword has an unexpected JSON type
    #[error("invalid schema field {field}: expected {expected}")]
    InvalidShape {
        /// Offending field or property name
        field: String,
        /// Expected JSON type
        expected: &'static str,
    },
}
