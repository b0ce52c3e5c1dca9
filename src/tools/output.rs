//! Tool output parsing.
//!
//! Converts captured stdout into structured records per the schema's
//! declared output format. Parsing never fails the step: malformed content
//! degrades to a `{error, raw}` record.

use super::schema::OutputFormat;

/// Parse captured stdout according to the declared format.
///
/// - `text` returns the raw output as a single JSON string
/// - `json` decodes one record per non-empty line (JSONL); undecodable
///   lines become `{error, raw}` records
/// - `csv` maps each data row through the header row; ragged rows become
///   `{error, raw}` records
pub fn parse_output(format: OutputFormat, stdout: &str) -> serde_json::Value {
    match format {
        OutputFormat::Text => serde_json::Value::String(stdout.to_owned()),
        OutputFormat::Json => parse_jsonl(stdout),
        OutputFormat::Csv => parse_csv(stdout),
    }
}

/// Decode JSONL output, one record per non-empty line.
fn parse_jsonl(stdout: &str) -> serde_json::Value {
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|e| {
                serde_json::json!({
                    "error": format!("invalid JSON record: {e}"),
                    "raw": line,
                })
            })
        })
        .collect();
    serde_json::Value::Array(records)
}

/// Decode header-mapped CSV output.
///
/// A deliberately simple comma split — the tools in the registry do not
/// emit quoted fields.
fn parse_csv(stdout: &str) -> serde_json::Value {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    let header: Vec<&str> = match lines.next() {
        Some(h) => h.split(',').map(str::trim).collect(),
        None => return serde_json::Value::Array(Vec::new()),
    };

    let records: Vec<serde_json::Value> = lines
        .map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != header.len() {
                return serde_json::json!({
                    "error": format!(
                        "row has {} fields, header has {}",
                        fields.len(),
                        header.len()
                    ),
                    "raw": line,
                });
            }
            let map: serde_json::Map<String, serde_json::Value> = header
                .iter()
                .zip(fields.iter())
                .map(|(k, v)| ((*k).to_owned(), serde_json::Value::String((*v).to_owned())))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();

    serde_json::Value::Array(records)
}
