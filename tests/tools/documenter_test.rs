//! Auto-documenter help-text parsing tests.

use sentryai::tools::documenter::parse_help_text;
use sentryai::tools::ParamType;

const HELP: &str = "\
gofetch is a fast host discovery and probing utility for security testing

Usage:
  gofetch [flags]

Flags:
  -u, --url string     target URL to probe (required)
  -p, --ports int      ports to scan
      --output file    write results to file
      --json           emit JSON lines
  -w value             wordlist, comma-separated list of paths
";

#[test]
fn flags_are_extracted_with_types() {
    let schema = parse_help_text("gofetch", "/usr/local/bin/gofetch", HELP, "1.2.3");

    let url = schema
        .parameters
        .iter()
        .find(|p| p.name == "url")
        .expect("url param");
    assert_eq!(url.flag, "--url");
    assert!(url.required);

    let ports = schema
        .parameters
        .iter()
        .find(|p| p.name == "ports")
        .expect("ports param");
    assert_eq!(ports.param_type, ParamType::Integer);

    let output = schema
        .parameters
        .iter()
        .find(|p| p.name == "output")
        .expect("output param");
    assert_eq!(output.param_type, ParamType::File);

    let json = schema
        .parameters
        .iter()
        .find(|p| p.name == "json")
        .expect("json param");
    assert_eq!(json.param_type, ParamType::Boolean);
}

#[test]
fn description_comes_from_the_first_meaningful_line() {
    let schema = parse_help_text("gofetch", "/usr/local/bin/gofetch", HELP, "1.2.3");
    assert!(schema.description.starts_with("gofetch is a fast host"));
}

#[test]
fn category_is_inferred_from_name_and_description() {
    let schema = parse_help_text("gofetch", "/usr/local/bin/gofetch", HELP, "1.2.3");
    // "discovery" keyword maps to recon.
    assert_eq!(schema.category, "recon");
}

#[test]
fn version_and_binary_are_recorded() {
    let schema = parse_help_text("gofetch", "/usr/local/bin/gofetch", HELP, "1.2.3");
    assert_eq!(schema.version, "1.2.3");
    assert_eq!(schema.binary_path, "/usr/local/bin/gofetch");
    // Documented tools have no sandbox image until an operator assigns one.
    assert!(schema.container_image.is_none());
}
