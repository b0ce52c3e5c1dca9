//! Structured tool schemas.
//!
//! A [`ToolSchema`] is the unit of "tool teaching": a language-neutral JSON
//! document describing a security tool's binary, parameters, sandbox image,
//! and output format. Schemas are persisted one file per tool and consumed
//! by the command synthesizer, the dispatcher, and the agent prompt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Free-form string.
    String,
    /// Integer value.
    Integer,
    /// Flag-only boolean.
    Boolean,
    /// List of values, comma-joined on the command line.
    Array,
    /// Filesystem path.
    File,
    /// URL value.
    Url,
}

/// A single tool parameter or flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Snake-case argument name.
    pub name: String,
    /// The CLI flag, e.g. `-u` or `--url`.
    pub flag: String,
    /// What the parameter does.
    pub description: String,
    /// Value type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Default value, when one exists.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Permitted values, when constrained.
    #[serde(default)]
    pub choices: Vec<String>,
    /// Example value for the agent prompt.
    #[serde(default)]
    pub example: Option<String>,
}

/// Output format produced by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Unstructured text.
    Text,
    /// One JSON record per line.
    Json,
    /// Comma-separated values with a header row.
    Csv,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

/// Complete definition of a security tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name; doubles as the registry key and file stem.
    pub name: String,
    /// Tool version string.
    #[serde(default = "unknown_version")]
    pub version: String,
    /// One-line description.
    pub description: String,
    /// Binary path inside the sandbox image.
    pub binary_path: String,
    /// Container image the tool runs in; `None` means not sandboxable.
    #[serde(default)]
    pub container_image: Option<String>,
    /// Ordered parameter declarations.
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    /// Example invocations.
    #[serde(default)]
    pub usage_examples: Vec<String>,
    /// Category, e.g. `recon`, `scanning`, `vulnerability`.
    #[serde(default = "general_category")]
    pub category: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the tool needs root inside its container.
    #[serde(default)]
    pub requires_root: bool,
    /// Default wall-clock timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_default_seconds: u64,
    /// Output format the parser should expect.
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn unknown_version() -> String {
    "unknown".to_owned()
}

fn general_category() -> String {
    "general".to_owned()
}

fn default_timeout() -> u64 {
    300
}

/// Argument validation failure against a schema.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid arguments for {tool}: {}", problems.join("; "))]
pub struct ArgumentError {
    /// The tool whose schema rejected the arguments.
    pub tool: String,
    /// One message per violation.
    pub problems: Vec<String>,
}

impl ToolSchema {
    /// Validate an argument map against this schema.
    ///
    /// Required parameters must be present; typed parameters must carry a
    /// compatible JSON value; constrained parameters must use a declared
    /// choice. Arguments not declared in the schema are ignored here (the
    /// synthesizer drops them).
    ///
    /// # Errors
    ///
    /// Returns an [`ArgumentError`] listing every violation found.
    pub fn validate_arguments(
        &self,
        arguments: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), ArgumentError> {
        let mut problems = Vec::new();

        for param in &self.parameters {
            let value = match arguments.get(&param.name) {
                Some(v) => v,
                None => {
                    if param.required && param.default.is_none() {
                        problems.push(format!("missing required argument '{}'", param.name));
                    }
                    continue;
                }
            };

            if !type_matches(param.param_type, value) {
                problems.push(format!(
                    "argument '{}' must be of type {:?}",
                    param.name, param.param_type
                ));
                continue;
            }

            if !param.choices.is_empty() {
                let as_text = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
                if !param.choices.iter().any(|c| c == &as_text) {
                    problems.push(format!(
                        "argument '{}' must be one of [{}]",
                        param.name,
                        param.choices.join(", ")
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ArgumentError {
                tool: self.name.clone(),
                problems,
            })
        }
    }

    /// Render this schema as an agent-consumable function definition.
    pub fn to_agent_definition(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut description = param.description.clone();
            if let Some(example) = &param.example {
                description.push_str(&format!(" (e.g., '{example}')"));
            }

            let mut prop = serde_json::Map::new();
            prop.insert("type".to_owned(), param_type_json(param.param_type).into());
            prop.insert("description".to_owned(), description.into());
            if !param.choices.is_empty() {
                prop.insert(
                    "enum".to_owned(),
                    serde_json::Value::from(param.choices.clone()),
                );
            }
            if let Some(default) = &param.default {
                prop.insert("default".to_owned(), default.clone());
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(prop));

            if param.required {
                required.push(param.name.clone());
            }
        }

        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }
}

/// JSON-schema type label for a parameter type.
fn param_type_json(param_type: ParamType) -> &'static str {
    match param_type {
        ParamType::String | ParamType::File | ParamType::Url => "string",
        ParamType::Integer => "integer",
        ParamType::Boolean => "boolean",
        ParamType::Array => "array",
    }
}

/// Whether a JSON value is acceptable for a parameter type.
fn type_matches(param_type: ParamType, value: &serde_json::Value) -> bool {
    match param_type {
        ParamType::String | ParamType::File | ParamType::Url => value.is_string(),
        ParamType::Integer => value.is_i64() || value.is_u64(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Array => value.is_array() || value.is_string(),
    }
}

// ---------------------------------------------------------------------------
// Built-in schemas
// ---------------------------------------------------------------------------

/// The built-in tool set seeded into a fresh registry directory.
///
/// Covers the standard reconnaissance chain: subdomain enumeration, port
/// scanning, template-driven vulnerability scanning, HTTP probing, and web
/// crawling.
pub fn builtin_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "subfinder".to_owned(),
            version: "2".to_owned(),
            description: "Passive subdomain enumeration for a target domain".to_owned(),
            binary_path: "/usr/local/bin/subfinder".to_owned(),
            container_image: Some("projectdiscovery/subfinder:latest".to_owned()),
            parameters: vec![
                param_required("domain", "-d", "Target domain to enumerate", ParamType::String, Some("example.com")),
                param_flag("silent", "-silent", "Suppress banner output"),
                param_flag("json", "-json", "Emit JSONL records"),
                param_optional("sources", "-sources", "Comma-separated sources to use", ParamType::Array),
            ],
            usage_examples: vec!["subfinder -d example.com -silent -json".to_owned()],
            category: "recon".to_owned(),
            tags: vec!["subdomain".to_owned(), "passive".to_owned()],
            requires_root: false,
            timeout_default_seconds: 300,
            output_format: OutputFormat::Json,
        },
        ToolSchema {
            name: "naabu".to_owned(),
            version: "2".to_owned(),
            description: "Fast TCP port scanner".to_owned(),
            binary_path: "/usr/local/bin/naabu".to_owned(),
            container_image: Some("projectdiscovery/naabu:latest".to_owned()),
            parameters: vec![
                param_required("host", "-host", "Target host or IP", ParamType::String, Some("www.example.com")),
                param_optional("port", "-port", "Ports or ranges to scan", ParamType::String),
                param_optional("top_ports", "-top-ports", "Scan the N most common ports", ParamType::Integer),
                param_flag("silent", "-silent", "Suppress banner output"),
                param_flag("json", "-json", "Emit JSONL records"),
            ],
            usage_examples: vec!["naabu -host www.example.com -top-ports 100 -json".to_owned()],
            category: "scanning".to_owned(),
            tags: vec!["ports".to_owned(), "tcp".to_owned()],
            requires_root: false,
            timeout_default_seconds: 600,
            output_format: OutputFormat::Json,
        },
        ToolSchema {
            name: "nuclei".to_owned(),
            version: "3".to_owned(),
            description: "Template-driven vulnerability scanner".to_owned(),
            binary_path: "/usr/local/bin/nuclei".to_owned(),
            container_image: Some("projectdiscovery/nuclei:latest".to_owned()),
            parameters: vec![
                param_required("url", "-u", "Target URL or host", ParamType::Url, Some("https://www.example.com")),
                param_optional("tags", "-tags", "Template tags to run", ParamType::Array),
                param_optional("severity", "-severity", "Filter templates by severity", ParamType::Array),
                param_flag("silent", "-silent", "Suppress banner output"),
                param_flag("jsonl", "-jsonl", "Emit JSONL records"),
            ],
            usage_examples: vec!["nuclei -u https://www.example.com -tags xss -jsonl".to_owned()],
            category: "vulnerability".to_owned(),
            tags: vec!["cve".to_owned(), "templates".to_owned()],
            requires_root: false,
            timeout_default_seconds: 900,
            output_format: OutputFormat::Json,
        },
        ToolSchema {
            name: "httpx".to_owned(),
            version: "1".to_owned(),
            description: "HTTP prober for liveness, titles, and technologies".to_owned(),
            binary_path: "/usr/local/bin/httpx".to_owned(),
            container_image: Some("projectdiscovery/httpx:latest".to_owned()),
            parameters: vec![
                param_required("target", "-u", "Target host or URL", ParamType::String, Some("www.example.com")),
                param_flag("title", "-title", "Capture page titles"),
                param_flag("tech_detect", "-tech-detect", "Fingerprint technologies"),
                param_flag("status_code", "-status-code", "Capture status codes"),
                param_flag("silent", "-silent", "Suppress banner output"),
                param_flag("json", "-json", "Emit JSONL records"),
            ],
            usage_examples: vec!["httpx -u www.example.com -title -status-code -json".to_owned()],
            category: "web".to_owned(),
            tags: vec!["http".to_owned(), "probe".to_owned()],
            requires_root: false,
            timeout_default_seconds: 300,
            output_format: OutputFormat::Json,
        },
        ToolSchema {
            name: "katana".to_owned(),
            version: "1".to_owned(),
            description: "Crawls a web application and lists discovered endpoints".to_owned(),
            binary_path: "/usr/local/bin/katana".to_owned(),
            container_image: Some("projectdiscovery/katana:latest".to_owned()),
            parameters: vec![
                param_required("url", "-u", "Root URL to crawl", ParamType::Url, Some("https://www.example.com")),
                param_optional("depth", "-d", "Maximum crawl depth", ParamType::Integer),
                param_flag("silent", "-silent", "Suppress banner output"),
                param_flag("jsonl", "-jsonl", "Emit JSONL records"),
            ],
            usage_examples: vec!["katana -u https://www.example.com -d 2 -jsonl".to_owned()],
            category: "web".to_owned(),
            tags: vec!["crawler".to_owned(), "spider".to_owned()],
            requires_root: false,
            timeout_default_seconds: 600,
            output_format: OutputFormat::Json,
        },
    ]
}

fn param_required(
    name: &str,
    flag: &str,
    description: &str,
    param_type: ParamType,
    example: Option<&str>,
) -> ToolParameter {
    ToolParameter {
        name: name.to_owned(),
        flag: flag.to_owned(),
        description: description.to_owned(),
        param_type,
        required: true,
        default: None,
        choices: Vec::new(),
        example: example.map(str::to_owned),
    }
}

fn param_optional(name: &str, flag: &str, description: &str, param_type: ParamType) -> ToolParameter {
    ToolParameter {
        name: name.to_owned(),
        flag: flag.to_owned(),
        description: description.to_owned(),
        param_type,
        required: false,
        default: None,
        choices: Vec::new(),
        example: None,
    }
}

fn param_flag(name: &str, flag: &str, description: &str) -> ToolParameter {
    ToolParameter {
        name: name.to_owned(),
        flag: flag.to_owned(),
        description: description.to_owned(),
        param_type: ParamType::Boolean,
        required: false,
        default: None,
        choices: Vec::new(),
        example: None,
    }
}
