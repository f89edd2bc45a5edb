//! Tool-server descriptors and discovery.
//!
//! Descriptor files are JSON documents with a top-level `mcpServers` map of
//! name to launch descriptor. `command` may be a single program with an
//! `args` list, or an argv list.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// How to launch one tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptor {
    pub name: String,
    /// Program followed by its arguments; never empty
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ServerDescriptor {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Program(String),
    Argv(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    command: CommandSpec,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    #[serde(rename = "mcpServers", alias = "servers", default)]
    servers: BTreeMap<String, RawDescriptor>,
}

impl RawDescriptor {
    fn into_descriptor(self, name: String) -> Option<ServerDescriptor> {
        let mut command = match self.command {
            CommandSpec::Program(program) => vec![program],
            CommandSpec::Argv(argv) => argv,
        };
        command.extend(self.args);

        if command.first().map_or(true, |p| p.trim().is_empty()) {
            warn!("⚠️ Tool server '{}' has no launch command, skipping", name);
            return None;
        }
        Some(ServerDescriptor {
            name,
            command,
            env: self.env,
        })
    }
}

/// Parse one descriptor document
pub fn parse_descriptors(content: &str) -> serde_json::Result<Vec<ServerDescriptor>> {
    let file: DescriptorFile = serde_json::from_str(content)?;
    Ok(file
        .servers
        .into_iter()
        .filter_map(|(name, raw)| raw.into_descriptor(name))
        .collect())
}

/// Merged name → descriptor table, read-only once built
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    servers: BTreeMap<String, ServerDescriptor>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge sources in order; the first definition of a name wins
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Vec<ServerDescriptor>>,
    {
        let mut table = Self::new();
        for source in sources {
            for descriptor in source {
                table.insert_if_absent(descriptor);
            }
        }
        table
    }

    /// Read descriptor files in order. Missing files are skipped and
    /// unreadable ones are logged and skipped.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut table = Self::new();
        for path in paths {
            let path = path.as_ref();
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    debug!("No descriptor file at {}: {}", path.display(), e);
                    continue;
                }
            };

            match parse_descriptors(&content) {
                Ok(descriptors) => {
                    let count = descriptors.len();
                    let added = descriptors
                        .into_iter()
                        .filter(|d| table.insert_if_absent(d.clone()))
                        .count();
                    info!(
                        "📂 Loaded {} tool servers from {} ({} new)",
                        count,
                        path.display(),
                        added
                    );
                }
                Err(e) => warn!("⚠️ Invalid descriptor file {}: {}", path.display(), e),
            }
        }
        table
    }

    /// Returns `false` if the name was already defined
    pub fn insert_if_absent(&mut self, descriptor: ServerDescriptor) -> bool {
        if self.servers.contains_key(&descriptor.name) {
            debug!("Tool server '{}' already defined, keeping first", descriptor.name);
            return false;
        }
        self.servers.insert(descriptor.name.clone(), descriptor);
        true
    }

    pub fn get(&self, name: &str) -> Option<&ServerDescriptor> {
        self.servers.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.values()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_program_and_args() {
        let json = r#"{"mcpServers": {"memory": {"command": "node", "args": ["memory.js"], "env": {"DEBUG": "1"}}}}"#;
        let descriptors = parse_descriptors(json).unwrap();
        assert_eq!(descriptors.len(), 1);
        let memory = &descriptors[0];
        assert_eq!(memory.name, "memory");
        assert_eq!(memory.program(), "node");
        assert_eq!(memory.args(), ["memory.js".to_string()]);
        assert_eq!(memory.env.get("DEBUG").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_argv_list() {
        let json = r#"{"mcpServers": {"py": {"command": ["python3", "-m", "server"]}}}"#;
        let descriptors = parse_descriptors(json).unwrap();
        assert_eq!(descriptors[0].command, vec!["python3", "-m", "server"]);
        assert!(descriptors[0].env.is_empty());
    }

    #[test]
    fn test_empty_command_skipped() {
        let json = r#"{"mcpServers": {"broken": {"command": []}, "ok": {"command": "true"}}}"#;
        let names: Vec<String> = parse_descriptors(json)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn test_missing_key_is_empty() {
        assert!(parse_descriptors(r#"{"other": 1}"#).unwrap().is_empty());
    }

    #[test]
    fn test_first_definition_wins() {
        let first = vec![ServerDescriptor::new("files", vec!["a".into()])];
        let second = vec![
            ServerDescriptor::new("files", vec!["b".into()]),
            ServerDescriptor::new("memory", vec!["c".into()]),
        ];
        let table = DescriptorTable::from_sources([first, second]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("files").unwrap().program(), "a");
        assert_eq!(table.names(), vec!["files", "memory"]);
    }

    #[test]
    fn test_load_skips_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        let missing = dir.path().join("missing.json");

        let mut file = std::fs::File::create(&good).unwrap();
        writeln!(file, r#"{{"mcpServers": {{"echo": {{"command": "cat"}}}}}}"#).unwrap();
        std::fs::write(&bad, "not json").unwrap();

        let table = DescriptorTable::load(&[missing, bad, good]);
        assert_eq!(table.names(), vec!["echo"]);
    }
}
