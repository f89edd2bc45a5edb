//! Voice command handler backed by the tool dispatcher.
//!
//! Tool-control commands run the registry tool named after the command's
//! action (see `tool_routes` in the config). Agent requests are
//! acknowledged, or run as tools when a tool of the same name exists.

use crate::commands::{Command, CommandType, GENERAL_QUERY};
use crate::session::CommandHandler;
use crate::tools::ToolDispatcher;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

pub struct DispatchHandler {
    dispatcher: ToolDispatcher,
}

impl DispatchHandler {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self { dispatcher }
    }

    async fn run_tool(&self, command: &Command) -> String {
        let arguments = tool_arguments(command);
        let record = self.dispatcher.invoke(&command.action, arguments).await;
        if record.success {
            format!("{} {}", spoken_lead(command), record.summary())
        } else {
            // The lead announces success, so failures get a neutral one
            format!(
                "Sorry, {} failed. {}",
                command.action.replace('_', " "),
                record.summary()
            )
        }
    }
}

/// Arguments in the shape the matching tool servers expect
pub fn tool_arguments(command: &Command) -> Map<String, Value> {
    let param = |name: &str| command.param(name).unwrap_or_default().to_string();
    let value = match command.action.as_str() {
        "cursor_open_file" => json!({ "filePath": param("file_path") }),
        "cursor_create_file" => json!({ "fileName": param("file_name"), "content": "" }),
        "cursor_search_files" => json!({ "query": param("query") }),
        "memory_save" => json!({
            "content": param("content"),
            "type": "voice_note",
            "relevance": 1.0
        }),
        "file_watch" => json!({ "paths": [param("path")] }),
        _ => {
            return command
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect()
        }
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn spoken_lead(command: &Command) -> String {
    let param = |name: &str| command.param(name).unwrap_or_default();
    match command.action.as_str() {
        "cursor_open_file" => format!("Opening {} in Cursor.", param("file_path")),
        "cursor_create_file" => format!("Creating file {}.", param("file_name")),
        "cursor_search_files" => format!("Searching for '{}' in files.", param("query")),
        "memory_save" => "Saved to memory.".to_string(),
        "file_watch" => format!("Watching {} for changes.", param("path")),
        other => format!("Ran {}.", other),
    }
}

fn acknowledge(command: &Command) -> String {
    let param = |name: &str| command.param(name).unwrap_or_default();
    match command.action.as_str() {
        "code_request" => format!(
            "I'll help you write {}. Let me process this request.",
            param("description")
        ),
        "web_browse" => format!("I'll browse to {} for you.", param("url")),
        "web_search" => format!("Searching the web for '{}'.", param("query")),
        "translate" => format!(
            "Translating '{}' to {}.",
            param("text"),
            param("target_language")
        ),
        other => format!("Agent command '{}' not implemented", other),
    }
}

#[async_trait]
impl CommandHandler for DispatchHandler {
    async fn handle(&self, command: &Command) -> anyhow::Result<String> {
        info!("🗣️ Voice command: {} ({})", command.original_text, command.action);
        let has_tool = self.dispatcher.registry().contains(&command.action);

        let reply = match command.kind {
            CommandType::ToolControl if has_tool => self.run_tool(command).await,
            CommandType::ToolControl => {
                format!("No tool is configured for {}.", command.action)
            }
            CommandType::AgentRequest if has_tool => self.run_tool(command).await,
            CommandType::AgentRequest => acknowledge(command),
            _ if command.action == GENERAL_QUERY => format!(
                "I heard '{}', but I don't have a command for that.",
                command.param("query").unwrap_or_default()
            ),
            _ => format!("Command received: {}", command.action),
        };
        Ok(reply)
    }
}
