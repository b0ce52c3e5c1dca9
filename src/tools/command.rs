//! Command synthesis: structured arguments to a stable argv.

use std::collections::BTreeMap;

use super::schema::{ParamType, ToolSchema};

/// Build a command line from a schema and an argument map.
///
/// Parameters are emitted in schema declaration order, which keeps the
/// argv stable for identical inputs. Per type:
///
/// - boolean `true` appends the bare flag; `false` (or absence) omits it
/// - arrays append the flag followed by the comma-joined values
/// - scalars append the flag followed by the stringified value
///
/// Arguments not declared in the schema are silently dropped. The returned
/// argv starts with the schema's binary path.
pub fn synthesize_command(
    schema: &ToolSchema,
    arguments: &BTreeMap<String, serde_json::Value>,
) -> Vec<String> {
    let mut argv = vec![schema.binary_path.clone()];

    for param in &schema.parameters {
        let value = match arguments.get(&param.name).or(param.default.as_ref()) {
            Some(v) => v,
            None => continue,
        };

        match param.param_type {
            ParamType::Boolean => {
                if value.as_bool().unwrap_or(false) {
                    argv.push(param.flag.clone());
                }
            }
            ParamType::Array => {
                argv.push(param.flag.clone());
                argv.push(join_array(value));
            }
            ParamType::String | ParamType::Integer | ParamType::File | ParamType::Url => {
                argv.push(param.flag.clone());
                argv.push(scalar_text(value));
            }
        }
    }

    argv
}

/// Comma-join an array value; non-arrays pass through as scalars.
fn join_array(value: &serde_json::Value) -> String {
    match value.as_array() {
        Some(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(","),
        None => scalar_text(value),
    }
}

/// Render a scalar JSON value without surrounding quotes.
fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
