//! Disk-backed tool registry with hot reload.
//!
//! One JSON document per tool, named by the tool, in a registry directory.
//! A [`notify`] watcher reloads changed files; readers take an immutable
//! snapshot so refresh never blocks dispatch (copy-on-write).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::schema::{builtin_schemas, ToolSchema};

/// Immutable registry snapshot handed to readers.
type Snapshot = Arc<HashMap<String, Arc<ToolSchema>>>;

/// Central registry of tool schemas.
///
/// Built-in schemas are written to the directory on first start; additional
/// schemas arrive from the offline auto-documenter or operator edits, and
/// the watcher picks them up without a restart.
pub struct ToolRegistry {
    schemas: RwLock<Snapshot>,
    dir: PathBuf,
    /// Watcher handle (kept alive to maintain notifications).
    _watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("dir", &self.dir)
            .field("tool_count", &self.count())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a registry, seeding builtins, loading all schema files, and
    /// starting the file watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read, or the
    /// watcher cannot be initialized.
    pub fn new(dir: PathBuf) -> anyhow::Result<Arc<Self>> {
        std::fs::create_dir_all(&dir)?;
        seed_builtins(&dir)?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                if let Ok(evt) = event {
                    for path in evt.paths {
                        if let Err(e) = tx.send(path) {
                            warn!(error = %e, "failed to forward watcher event");
                        }
                    }
                }
            })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let registry = Arc::new(Self {
            schemas: RwLock::new(Arc::new(HashMap::new())),
            dir: dir.clone(),
            _watcher: Some(watcher),
        });
        registry.reload_all()?;

        let registry_for_thread = Arc::clone(&registry);
        std::thread::spawn(move || {
            while let Ok(path) = rx.recv() {
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    debug!(path = %path.display(), "tool schema change detected");
                    if let Err(e) = registry_for_thread.reload_all() {
                        warn!(error = %e, "tool registry reload failed");
                    }
                }
            }
        });

        info!(count = registry.count(), dir = %dir.display(), "tool registry initialised");
        Ok(registry)
    }

    /// Create a registry without a watcher (for tests and one-shot CLI use).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read.
    pub fn new_without_watcher(dir: PathBuf) -> anyhow::Result<Arc<Self>> {
        std::fs::create_dir_all(&dir)?;
        seed_builtins(&dir)?;

        let registry = Arc::new(Self {
            schemas: RwLock::new(Arc::new(HashMap::new())),
            dir,
            _watcher: None,
        });
        registry.reload_all()?;
        Ok(registry)
    }

    /// Look up a schema by tool name.
    pub fn get(&self, name: &str) -> Option<Arc<ToolSchema>> {
        self.snapshot().get(name).cloned()
    }

    /// Whether a tool name resolves in the registry.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn count(&self) -> usize {
        self.snapshot().len()
    }

    /// All schemas as agent-consumable function definitions.
    pub fn agent_definitions(&self) -> Vec<serde_json::Value> {
        let snapshot = self.snapshot();
        let mut names: Vec<&String> = snapshot.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| snapshot.get(n))
            .map(|s| s.to_agent_definition())
            .collect()
    }

    /// Persist a schema to disk and refresh the snapshot.
    ///
    /// Returns the registered tool name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the reload fails.
    pub fn register(&self, schema: &ToolSchema) -> anyhow::Result<String> {
        let path = self.dir.join(format!("{}.json", schema.name));
        let content = serde_json::to_string_pretty(schema)?;
        std::fs::write(&path, content)?;
        self.reload_all()?;
        Ok(schema.name.clone())
    }

    /// Reload every schema file, replacing the snapshot atomically.
    ///
    /// Invalid files are skipped with a warning so one bad document cannot
    /// take down the whole registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry directory cannot be read.
    pub fn reload_all(&self) -> anyhow::Result<()> {
        let mut loaded: HashMap<String, Arc<ToolSchema>> = HashMap::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_schema(&path) {
                Ok(schema) => {
                    loaded.insert(schema.name.clone(), Arc::new(schema));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping invalid tool schema");
                }
            }
        }

        if let Ok(mut guard) = self.schemas.write() {
            *guard = Arc::new(loaded);
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        self.schemas
            .read()
            .map(|s| Arc::clone(&s))
            .unwrap_or_else(|_| Arc::new(HashMap::new()))
    }
}

/// Write built-in schemas for any tool missing a file.
fn seed_builtins(dir: &Path) -> anyhow::Result<()> {
    for schema in builtin_schemas() {
        let path = dir.join(format!("{}.json", schema.name));
        if path.exists() {
            continue;
        }
        let content = serde_json::to_string_pretty(&schema)?;
        std::fs::write(&path, content)?;
        debug!(tool = %schema.name, "seeded builtin tool schema");
    }
    Ok(())
}

/// Load and decode one schema file.
fn load_schema(path: &Path) -> anyhow::Result<ToolSchema> {
    let content = std::fs::read_to_string(path)?;
    let schema: ToolSchema = serde_json::from_str(&content)?;
    Ok(schema)
}
