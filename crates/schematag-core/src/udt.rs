//! Ignition UDT definition builder.
//!
//! Renders a `SchemaModel` as the tag JSON accepted by Ignition's tag import:
//!
//! ```json
//! {
//!   "name": "Sensor",
//!   "tagType": "UdtType",
//!   "tags": [
//!     { "name": "reading", "tagType": "AtomicTag", "valueSource": "memory",
//!       "dataType": "Float4", "readPermissions": { "accessRights": "Read_Only" } }
//!   ]
//! }
//! ```
//!
//! Inline object properties cannot be expressed inside one UDT, so each one
//! becomes a separate synthetic UDT named `<Parent>_<property>` that has to
//! be imported before the parent.

use crate::model::{PropertyDefinition, SchemaModel};
use crate::types::{map_to_ignition_type, DataType};
use serde::{Deserialize, Serialize};

/// Kind of node in an Ignition tag tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagType {
    /// UDT definition
    UdtType,
    /// Instance of a UDT
    UdtInstance,
    /// Value-carrying tag
    AtomicTag,
}

/// Where an atomic tag's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Memory tag, written by clients
    Memory,
}

/// Access rights applied to a member tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessRights {
    /// No writes allowed
    #[serde(rename = "Read_Only")]
    ReadOnly,
}

/// Read permission block of a member tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPermissions {
    /// Access rights
    pub access_rights: AccessRights,
}

/// A member tag of a UDT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDefinition {
    /// Member name
    pub name: String,
    /// Tooltip shown in the designer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Tag kind
    pub tag_type: TagType,
    /// UDT type of an instance member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    /// Value source of an atomic member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_source: Option<ValueSource>,
    /// Data type of an atomic member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Initial value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Read permissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_permissions: Option<ReadPermissions>,
}

impl TagDefinition {
    fn instance(name: &str, tooltip: Option<String>, type_id: String) -> Self {
        Self {
            name: name.to_string(),
            tooltip,
            tag_type: TagType::UdtInstance,
            type_id: Some(type_id),
            value_source: None,
            data_type: None,
            value: None,
            read_permissions: None,
        }
    }

    fn read_only_memory(name: &str, tooltip: Option<String>, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            tooltip,
            tag_type: TagType::AtomicTag,
            type_id: None,
            value_source: Some(ValueSource::Memory),
            data_type: Some(data_type),
            value: None,
            read_permissions: Some(ReadPermissions {
                access_rights: AccessRights::ReadOnly,
            }),
        }
    }
}

/// A UDT definition ready for import into a provider's `_types_` folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdtDefinition {
    /// Type name
    pub name: String,
    /// Always `UdtType`
    pub tag_type: TagType,
    /// Schema description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Parent type this UDT inherits from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    /// Member tags
    pub tags: Vec<TagDefinition>,
}

/// Builds UDT definitions from parsed schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdtDefinitionBuilder;

impl UdtDefinitionBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the UDT definition for a schema.
    #[must_use]
    pub fn build_udt(&self, schema: &SchemaModel) -> UdtDefinition {
        let tags = schema
            .properties
            .iter()
            .filter_map(|prop| self.build_tag(prop, schema))
            .collect();

        UdtDefinition {
            name: schema.name.clone(),
            tag_type: TagType::UdtType,
            documentation: non_empty(schema.description.as_ref()),
            type_id: schema
                .has_parent()
                .then(|| schema.parent_type.clone())
                .flatten(),
            tags,
        }
    }

    /// Build the synthetic UDTs for inline object properties, depth first.
    ///
    /// Each parent comes before its own nested types. Returns an empty vector
    /// when the schema has no inline objects.
    #[must_use]
    pub fn build_nested_udts(&self, schema: &SchemaModel) -> Vec<UdtDefinition> {
        let mut nested = Vec::new();

        for prop in &schema.properties {
            if !(prop.is_object() && prop.has_nested_properties()) || prop.is_reference() {
                continue;
            }

            let mut nested_schema = SchemaModel::new(nested_type_name(schema, prop));
            nested_schema.description =
                Some(format!("Nested type for {}.{}", schema.name, prop.name));
            nested_schema.properties.clone_from(&prop.nested_properties);

            nested.push(self.build_udt(&nested_schema));
            nested.extend(self.build_nested_udts(&nested_schema));
        }

        nested
    }

    /// Render one UDT as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self, udt: &UdtDefinition) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string_pretty(udt)?;
        tracing::debug!(udt = %udt.name, json, "Built UDT JSON");
        Ok(json)
    }

    /// Render several UDTs as a pretty JSON array, for batch import.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json_array(&self, udts: &[UdtDefinition]) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(udts)
    }

    fn build_tag(&self, prop: &PropertyDefinition, schema: &SchemaModel) -> Option<TagDefinition> {
        let tooltip = non_empty(prop.description.as_ref());

        if prop.is_reference() {
            let ref_type = prop.ref_type.clone().unwrap_or_default();
            return Some(TagDefinition::instance(&prop.name, tooltip, ref_type));
        }

        if prop.is_object() && prop.has_nested_properties() {
            return Some(TagDefinition::instance(
                &prop.name,
                tooltip,
                nested_type_name(schema, prop),
            ));
        }

        if prop.is_array() {
            return Some(TagDefinition::read_only_memory(
                &prop.name,
                tooltip,
                DataType::DataSet,
            ));
        }

        let Some(data_type) = map_to_ignition_type(Some(&prop.json_type), prop.format.as_deref())
        else {
            tracing::warn!(
                property = %prop.name,
                json_type = %prop.json_type,
                "Could not map type for property"
            );
            return None;
        };

        let mut tag = TagDefinition::read_only_memory(&prop.name, tooltip, data_type);
        tag.value = prop.default_value.as_ref().map(serde_json::Value::from);
        Some(tag)
    }
}

fn nested_type_name(schema: &SchemaModel, prop: &PropertyDefinition) -> String {
    format!("{}_{}", schema.name, prop.name)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
