//! Tool registry tests (watcher-free variant).

use sentryai::tools::schema::builtin_schemas;
use sentryai::tools::{OutputFormat, ToolRegistry, ToolSchema};

fn temp_registry() -> (tempfile::TempDir, std::sync::Arc<ToolRegistry>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry =
        ToolRegistry::new_without_watcher(dir.path().to_path_buf()).expect("registry");
    (dir, registry)
}

#[test]
fn fresh_registry_seeds_builtins() {
    let (_dir, registry) = temp_registry();
    assert_eq!(registry.count(), builtin_schemas().len());
    assert!(registry.contains("subfinder"));
    assert!(registry.contains("nuclei"));
    assert!(registry.contains("httpx"));
}

#[test]
fn unknown_tool_does_not_resolve() {
    let (_dir, registry) = temp_registry();
    assert!(registry.get("metasploit").is_none());
}

#[test]
fn register_persists_and_resolves() {
    let (dir, registry) = temp_registry();
    let schema = ToolSchema {
        name: "dnsx".to_owned(),
        version: "1".to_owned(),
        description: "DNS toolkit".to_owned(),
        binary_path: "/usr/local/bin/dnsx".to_owned(),
        container_image: Some("projectdiscovery/dnsx:latest".to_owned()),
        parameters: Vec::new(),
        usage_examples: Vec::new(),
        category: "recon".to_owned(),
        tags: Vec::new(),
        requires_root: false,
        timeout_default_seconds: 120,
        output_format: OutputFormat::Json,
    };

    let registered = registry.register(&schema).expect("register");
    assert_eq!(registered, "dnsx");
    assert!(registry.contains("dnsx"));
    assert!(dir.path().join("dnsx.json").is_file());
}

#[test]
fn invalid_schema_file_is_skipped() {
    let (dir, registry) = temp_registry();
    std::fs::write(dir.path().join("broken.json"), "{ nope").expect("write");
    registry.reload_all().expect("reload");
    // Builtins survive; the broken file simply does not load.
    assert_eq!(registry.count(), builtin_schemas().len());
}

#[test]
fn names_are_sorted() {
    let (_dir, registry) = temp_registry();
    let names = registry.names();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn agent_definitions_cover_every_tool() {
    let (_dir, registry) = temp_registry();
    assert_eq!(registry.agent_definitions().len(), registry.count());
}
