//! Offline auto-documenter: synthesize a [`ToolSchema`] from `--help`.
//!
//! When a new tool is installed the agent does not know how to drive it.
//! This best-effort process captures the tool's help and version output,
//! extracts flags with regex heuristics, and infers parameter types and a
//! category. It runs from the CLI only — never inside the mission path;
//! the core consumes only persisted, pre-validated schemas.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use super::schema::{OutputFormat, ParamType, ToolParameter, ToolSchema};

/// Flags tried, in order, to obtain help text.
const HELP_FLAGS: &[&str] = &["--help", "-h", "help", "-help"];

/// Flags tried, in order, to obtain a version string.
const VERSION_FLAGS: &[&str] = &["--version", "-v", "-V", "version"];

/// Minimum help-text length considered meaningful.
const MIN_HELP_LEN: usize = 50;

/// Errors from the documenter.
#[derive(Debug, thiserror::Error)]
pub enum DocumenterError {
    /// The binary could not be found.
    #[error("binary not found: {name}")]
    BinaryNotFound {
        /// The requested tool name.
        name: String,
    },

    /// The tool produced no usable help output.
    #[error("no usable help output from {name}")]
    NoHelpOutput {
        /// The probed tool name.
        name: String,
    },
}

/// `-f, --flag VALUE  description`
static LONG_SHORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-\w),?\s*(--[\w-]+)(?:\s+(\S+))?\s{2,}(.+)$").expect("flag regex is valid")
});

/// `--flag VALUE  description`
static LONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(--[\w-]+)(?:\s+(\S+))?\s{2,}(.+)$").expect("flag regex is valid")
});

/// `-f VALUE  description`
static SHORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-\w)(?:\s+(\S+))?\s{2,}(.+)$").expect("flag regex is valid")
});

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v?(\d+\.\d+\.?\d*)").expect("version regex is valid"));

/// Generates tool schemas from help text.
#[derive(Debug, Default)]
pub struct AutoDocumenter {
    /// Extra directory searched for binaries, in addition to `PATH`.
    pub tools_dir: Option<PathBuf>,
}

impl AutoDocumenter {
    /// Document a tool: locate the binary, capture help and version, parse.
    ///
    /// # Errors
    ///
    /// Returns [`DocumenterError`] when the binary cannot be found or
    /// produces no usable help output.
    pub async fn document_tool(
        &self,
        binary_name: &str,
        binary_path: Option<PathBuf>,
    ) -> Result<ToolSchema, DocumenterError> {
        let path = match binary_path {
            Some(p) => p,
            None => self
                .find_binary(binary_name)
                .ok_or_else(|| DocumenterError::BinaryNotFound {
                    name: binary_name.to_owned(),
                })?,
        };

        let help_text = capture_output(&path, HELP_FLAGS, Duration::from_secs(10)).await;
        let help_text = help_text
            .filter(|t| t.len() >= MIN_HELP_LEN)
            .ok_or_else(|| DocumenterError::NoHelpOutput {
                name: binary_name.to_owned(),
            })?;

        let version = capture_output(&path, VERSION_FLAGS, Duration::from_secs(5))
            .await
            .and_then(|out| {
                VERSION_RE
                    .captures(&out)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_owned())
            })
            .unwrap_or_else(|| "unknown".to_owned());

        Ok(parse_help_text(
            binary_name,
            &path.to_string_lossy(),
            &help_text,
            &version,
        ))
    }

    /// Find a binary on `PATH` or in the configured tools directory.
    fn find_binary(&self, name: &str) -> Option<PathBuf> {
        if let Some(paths) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&paths) {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        let candidate = self.tools_dir.as_ref()?.join(name);
        candidate.is_file().then_some(candidate)
    }
}

/// Try each flag until one produces output.
async fn capture_output(
    path: &std::path::Path,
    flags: &[&str],
    timeout: Duration,
) -> Option<String> {
    for flag in flags {
        let run = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(path)
                .arg(flag)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        if let Ok(Ok(output)) = run {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let text = if stdout.trim().is_empty() {
                stderr
            } else {
                stdout
            };
            if !text.trim().is_empty() {
                return Some(text.into_owned());
            }
        }
    }
    None
}

/// Build a schema from raw help text.
pub fn parse_help_text(name: &str, binary_path: &str, help_text: &str, version: &str) -> ToolSchema {
    let mut parameters = Vec::new();

    for line in help_text.lines() {
        let parsed = LONG_SHORT_RE
            .captures(line)
            .map(|c| {
                (
                    c.get(2).map(|m| m.as_str().to_owned()),
                    c.get(3).map(|m| m.as_str().to_owned()),
                    c.get(4).map_or(String::new(), |m| m.as_str().to_owned()),
                )
            })
            .or_else(|| {
                LONG_RE.captures(line).map(|c| {
                    (
                        c.get(1).map(|m| m.as_str().to_owned()),
                        c.get(2).map(|m| m.as_str().to_owned()),
                        c.get(3).map_or(String::new(), |m| m.as_str().to_owned()),
                    )
                })
            })
            .or_else(|| {
                SHORT_RE.captures(line).map(|c| {
                    (
                        c.get(1).map(|m| m.as_str().to_owned()),
                        c.get(2).map(|m| m.as_str().to_owned()),
                        c.get(3).map_or(String::new(), |m| m.as_str().to_owned()),
                    )
                })
            });

        let Some((Some(flag), value_hint, description)) = parsed else {
            continue;
        };

        let param_name = flag.trim_start_matches('-').replace('-', "_");
        let description = description.trim().to_owned();
        let lower = description.to_lowercase();
        let required = lower.contains("required") || lower.contains("mandatory");

        parameters.push(ToolParameter {
            name: param_name,
            flag,
            param_type: infer_type(value_hint.as_deref(), &description),
            required,
            default: None,
            choices: Vec::new(),
            example: None,
            description,
        });
    }

    let description = help_text
        .lines()
        .take(10)
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('-') && l.len() > 20)
        .unwrap_or("")
        .to_owned();

    let category = infer_category(name, &description);
    debug!(tool = %name, params = parameters.len(), category = %category, "documented tool");

    ToolSchema {
        name: name.to_owned(),
        version: version.to_owned(),
        description: if description.is_empty() {
            format!("{name} security tool")
        } else {
            description
        },
        binary_path: binary_path.to_owned(),
        container_image: None,
        parameters,
        usage_examples: Vec::new(),
        category,
        tags: Vec::new(),
        requires_root: false,
        timeout_default_seconds: 300,
        output_format: OutputFormat::Text,
    }
}

/// Infer a parameter type from the value hint and description.
fn infer_type(value_hint: Option<&str>, description: &str) -> ParamType {
    let hint = match value_hint {
        Some(h) => h.to_lowercase(),
        None => return ParamType::Boolean,
    };
    let desc = description.to_lowercase();

    if ["int", "number", "count", "port"].iter().any(|x| hint.contains(x)) {
        return ParamType::Integer;
    }
    if ["url", "http"].iter().any(|x| hint.contains(x)) {
        return ParamType::Url;
    }
    if ["file", "path", "output"].iter().any(|x| hint.contains(x)) {
        return ParamType::File;
    }
    if ["comma-separated", "list of"].iter().any(|x| desc.contains(x)) {
        return ParamType::Array;
    }
    ParamType::String
}

/// Infer a category from the tool's name and description.
fn infer_category(name: &str, description: &str) -> String {
    let combined = format!("{name} {description}").to_lowercase();

    let categories: &[(&str, &[&str])] = &[
        ("recon", &["subdomain", "dns", "whois", "enumerate", "discover"]),
        ("scanning", &["scan", "port", "service", "nmap", "masscan"]),
        ("vulnerability", &["vuln", "nuclei", "exploit", "cve"]),
        ("fuzzing", &["fuzz", "brute", "wordlist", "directory"]),
        ("web", &["http", "url", "web", "crawl", "spider"]),
        ("network", &["network", "packet", "traffic", "tcp", "udp"]),
    ];

    for (category, keywords) in categories {
        if keywords.iter().any(|kw| combined.contains(kw)) {
            return (*category).to_owned();
        }
    }
    "general".to_owned()
}
