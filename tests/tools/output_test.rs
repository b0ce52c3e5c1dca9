//! Output parsing tests.

use sentryai::tools::output::parse_output;
use sentryai::tools::OutputFormat;

#[test]
fn text_passes_through_raw() {
    let parsed = parse_output(OutputFormat::Text, "hello\nworld");
    assert_eq!(parsed, serde_json::json!("hello\nworld"));
}

#[test]
fn jsonl_decodes_one_record_per_line() {
    let stdout = "{\"host\":\"a.example.com\"}\n{\"host\":\"b.example.com\"}\n";
    let parsed = parse_output(OutputFormat::Json, stdout);
    let records = parsed.as_array().expect("array");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["host"], "a.example.com");
}

#[test]
fn jsonl_skips_blank_lines() {
    let stdout = "\n{\"host\":\"a.example.com\"}\n\n";
    let parsed = parse_output(OutputFormat::Json, stdout);
    assert_eq!(parsed.as_array().expect("array").len(), 1);
}

#[test]
fn invalid_json_line_becomes_error_record() {
    let stdout = "{\"host\":\"a.example.com\"}\nnot json at all\n";
    let parsed = parse_output(OutputFormat::Json, stdout);
    let records = parsed.as_array().expect("array");
    assert_eq!(records.len(), 2);
    assert!(records[1]["error"].is_string());
    assert_eq!(records[1]["raw"], "not json at all");
}

#[test]
fn csv_maps_rows_through_the_header() {
    let stdout = "host,port,service\nwww.example.com,443,https\n";
    let parsed = parse_output(OutputFormat::Csv, stdout);
    let records = parsed.as_array().expect("array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["host"], "www.example.com");
    assert_eq!(records[0]["port"], "443");
    assert_eq!(records[0]["service"], "https");
}

#[test]
fn ragged_csv_row_becomes_error_record() {
    let stdout = "host,port\nwww.example.com,443,extra\n";
    let parsed = parse_output(OutputFormat::Csv, stdout);
    let records = parsed.as_array().expect("array");
    assert!(records[0]["error"].is_string());
}

#[test]
fn empty_structured_output_is_an_empty_array() {
    assert_eq!(
        parse_output(OutputFormat::Json, ""),
        serde_json::json!([])
    );
    assert_eq!(parse_output(OutputFormat::Csv, ""), serde_json::json!([]));
}
