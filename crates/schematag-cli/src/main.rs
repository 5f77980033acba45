//! # Schema Tag Provider CLI
//!
//! Offline utilities for checking schemas before publishing them.

use anyhow::{Context, Result};
use schematag_core::{map_to_ignition_type, parse_schema, SchemaModel, UdtDefinitionBuilder};
use schematag_mqtt::TopicFilter;
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "parse" => {
            if args.len() < 3 {
                eprintln!("Usage: schematag parse <schema.json>");
                std::process::exit(1);
            }
            let schema = load_schema(Path::new(&args[2]))?;
            print!("{}", describe(&schema));
        }
        "udt" => {
            if args.len() < 3 {
                eprintln!("Usage: schematag udt <schema.json>");
                std::process::exit(1);
            }
            let schema = load_schema(Path::new(&args[2]))?;
            println!("{}", render_udts(&schema)?);
        }
        "topic" => {
            if args.len() < 4 {
                eprintln!("Usage: schematag topic <filter> <topic>");
                std::process::exit(1);
            }
            let name = TopicFilter::new(args[2].as_str()).schema_name(&args[3]);
            if name.is_empty() {
                eprintln!("No schema name in topic: {}", args[3]);
                std::process::exit(1);
            }
            println!("{name}");
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Parse a schema file, named after the file stem unless it has a title.
fn load_schema(path: &Path) -> Result<SchemaModel> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("schema");
    parse_schema(name, &content).with_context(|| format!("Invalid schema {}", path.display()))
}

fn describe(schema: &SchemaModel) -> String {
    let mut out = format!("{schema}\n");
    for prop in &schema.properties {
        let mapped = map_to_ignition_type(Some(&prop.json_type), prop.format.as_deref())
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let required = if schema.is_required(&prop.name) { " (required)" } else { "" };
        out.push_str(&format!(
            "  {}: {} -> {mapped}{required}\n",
            prop.name, prop.json_type
        ));
    }
    out
}

/// Nested UDTs first, then the main type, as one import array.
fn render_udts(schema: &SchemaModel) -> Result<String> {
    let builder = UdtDefinitionBuilder::new();
    let mut udts = builder.build_nested_udts(schema);
    udts.push(builder.build_udt(schema));
    builder.to_json_array(&udts).context("Failed to render UDT JSON")
}

fn print_help() {
    println!(
        r#"Schema Tag Provider CLI

USAGE:
    schematag <COMMAND> [OPTIONS]

COMMANDS:
    parse <file>            Show the parsed schema and the mapped tag types
    udt <file>              Print the UDT definitions as tag import JSON
    topic <filter> <topic>  Resolve the schema name carried by a topic
    help                    Show this help message

EXAMPLES:
    schematag parse schemas/Sensor.json
    schematag udt schemas/Sensor.json > Sensor-udt.json
    schematag topic "ignition/schemas/#" ignition/schemas/devices/Temperature
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_named_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pump.json");
        std::fs::write(&path, r#"{"properties": {"rpm": {"type": "integer"}}}"#).unwrap();

        let schema = load_schema(&path).unwrap();
        assert_eq!(schema.name, "Pump");
        assert!(describe(&schema).contains("rpm: integer -> Int4"));
    }

    #[test]
    fn describe_lists_one_line_per_property() {
        let schema = parse_schema(
            "Pump",
            r#"{"required": ["rpm"], "properties": {"rpm": {"type": "integer"}, "on": {"type": "boolean"}}}"#,
        )
        .unwrap();

        let text = describe(&schema);
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(
            lines,
            ["  rpm: integer -> Int4 (required)", "  on: boolean -> Boolean"]
        );
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn udts_rendered_nested_first() {
        let schema = parse_schema(
            "Tank",
            r#"{"properties": {"inlet": {"type": "object", "properties": {"open": {"type": "boolean"}}}}}"#,
        )
        .unwrap();

        let json = render_udts(&schema).unwrap();
        let nested = json.find("\"Tank_inlet\"").unwrap();
        let main = json.find("\"name\": \"Tank\"").unwrap();
        assert!(nested < main);
    }
}
