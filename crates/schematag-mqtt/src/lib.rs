//! # Schema Listener
//!
//! MQTT ingestion of JSON Schema documents.
//!
//! ## Topics
//!
//! Schemas are published below a base topic, one topic per schema:
//! - `ignition/schemas/Sensor` carries the schema `Sensor`
//! - `ignition/schemas/devices/Temperature` carries `devices_Temperature`
//!
//! A message with an empty payload deletes the schema. Publishers are
//! expected to use retained messages so a restarted listener sees the full set.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod topics;

pub use config::{parse_broker_url, qos_from_level, BackoffConfig, BrokerAddress, SchemaListenerConfig};
pub use listener::{Backoff, ListenerError, ListenerHandle, SchemaListener};
pub use topics::{classify, MessageError, SchemaEvent, TopicFilter};
