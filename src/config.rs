use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How recognized segments are handed to the command pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionOrder {
    /// One task per segment; deliveries may overlap and arrive out of order
    #[default]
    Concurrent,
    /// Single worker, segments delivered in capture order
    Sequential,
}

/// A voice action routed to a tool on a declared tool server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolRoute {
    pub server: String,
    pub tool: String,
}

impl ToolRoute {
    pub fn new(server: &str, tool: &str) -> Self {
        Self {
            server: server.to_string(),
            tool: tool.to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Speech
    pub wake_word: String,
    pub asr_engine: String,
    pub vosk_model_path: String,
    pub wyoming_host: String,
    pub wyoming_port: u16,
    pub tts_engine: String,
    pub piper_voice: String,
    pub tts_rate: u32,
    pub tts_volume: f32,

    // Capture
    pub input_device: Option<usize>,
    pub listen_timeout_secs: u64,
    pub phrase_limit_secs: f32,
    pub energy_threshold: f32,
    pub transcription_order: TranscriptionOrder,

    // Session
    pub history_capacity: usize,
    pub voice_corrections: HashMap<String, String>,

    // Tool servers
    pub descriptor_paths: Vec<PathBuf>,
    pub tool_timeout_secs: u64,
    pub tool_routes: HashMap<String, ToolRoute>,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_word: "agenticseek".to_string(),
            asr_engine: "vosk".to_string(),
            vosk_model_path: dirs::data_dir()
                .unwrap_or_default()
                .join("voxbridge/models/vosk-model-small-en-us")
                .to_string_lossy()
                .to_string(),
            wyoming_host: "localhost".to_string(),
            wyoming_port: 10300,
            tts_engine: "system".to_string(),
            piper_voice: "en_US-lessac-medium".to_string(),
            tts_rate: 180,
            tts_volume: 0.8,
            input_device: None,
            listen_timeout_secs: 5,
            phrase_limit_secs: 8.0,
            energy_threshold: 400.0,
            transcription_order: TranscriptionOrder::Concurrent,
            history_capacity: crate::history::DEFAULT_CAPACITY,
            voice_corrections: HashMap::from([
                ("agentic seek".to_string(), "agenticseek".to_string()),
                ("cursor i d e".to_string(), "cursor".to_string()),
            ]),
            descriptor_paths: default_descriptor_paths(),
            tool_timeout_secs: 30,
            tool_routes: HashMap::from([
                (
                    "cursor_open_file".to_string(),
                    ToolRoute::new("cursor-control", "cursor_open_file"),
                ),
                (
                    "cursor_create_file".to_string(),
                    ToolRoute::new("cursor-control", "cursor_create_file"),
                ),
                (
                    "cursor_search_files".to_string(),
                    ToolRoute::new("cursor-control", "cursor_search_files"),
                ),
                (
                    "memory_save".to_string(),
                    ToolRoute::new("memory-management", "memory_save_context"),
                ),
                (
                    "file_watch".to_string(),
                    ToolRoute::new("file-watcher", "watcher_start_monitoring"),
                ),
            ]),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from file, or fall back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from an explicit path
    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                // Graceful degradation: log warning and use defaults
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                // Backup corrupt file for debugging
                let backup_path = config_path.with_extension("json.corrupt");
                let _ = std::fs::rename(config_path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn listen_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tool_timeout_secs)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxbridge")
        .join("config.json")
}

/// Tool-server descriptor files, in merge order (first definition wins)
pub fn default_descriptor_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("claude").join("claude_desktop_config.json"));
    }
    paths.push(PathBuf::from(".mcp.json"));
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("voxbridge").join("servers.json"));
    }
    paths
}
