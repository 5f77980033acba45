//! # Schema Tag Provider Core
//!
//! Shared model and codecs for turning JSON Schema documents into Ignition
//! tag type definitions.
//!
//! This crate provides:
//! - An in-memory model of a parsed JSON Schema (`SchemaModel`, `PropertyDefinition`)
//! - A parser from JSON Schema text into that model
//! - The JSON Schema to Ignition `DataType` mapping
//! - A builder that renders UDT definition JSON suitable for tag import

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod model;
pub mod parser;
pub mod types;
pub mod udt;

pub use model::{DefaultValue, JsonType, PropertyDefinition, SchemaModel};
pub use parser::{parse_schema, ref_name, ParseError};
pub use types::{map_to_ignition_type, DataType};
pub use udt::{TagDefinition, UdtDefinition, UdtDefinitionBuilder};
