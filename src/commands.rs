//! Command interpretation
//!
//! Turns a transcribed utterance into a structured [`Command`] using an
//! ordered table of regular expressions. The first matching pattern wins;
//! there is no scoring across patterns.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error};

/// Confidence reported for any table match
pub const MATCHED_CONFIDENCE: f32 = 0.8;
/// Confidence reported when nothing matched
pub const UNMATCHED_CONFIDENCE: f32 = 0.3;
/// Action used for unmatched input
pub const GENERAL_QUERY: &str = "general_query";

/// Broad category of a command, in matching priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    ToolControl,
    AgentRequest,
    SystemControl,
    Conversation,
    Unknown,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandType::ToolControl => "tool_control",
            CommandType::AgentRequest => "agent_request",
            CommandType::SystemControl => "system_control",
            CommandType::Conversation => "conversation",
            CommandType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Structured result of interpreting an utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub action: String,
    pub parameters: BTreeMap<String, String>,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub original_text: String,
}

impl Command {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == CommandType::Unknown
    }
}

/// One row of the pattern table
struct Pattern {
    kind: CommandType,
    regex: Regex,
    action: &'static str,
    /// (parameter name, capture group index)
    params: &'static [(&'static str, usize)],
}

type PatternSpec = (
    CommandType,
    &'static str,
    &'static str,
    &'static [(&'static str, usize)],
);

/// Declaration order inside a type is matching order
const TABLE: &[PatternSpec] = &[
    // Tool control
    (
        CommandType::ToolControl,
        r"\bopen (?:file )?(.+?) in (?:cursor|editor)\b",
        "cursor_open_file",
        &[("file_path", 1)],
    ),
    (
        CommandType::ToolControl,
        r"\bremember (?:that )?(.+)",
        "memory_save",
        &[("content", 1)],
    ),
    (
        CommandType::ToolControl,
        r"\bwatch (?:the )?(.+?) (?:directory|folder|files)\b",
        "file_watch",
        &[("path", 1)],
    ),
    (
        CommandType::ToolControl,
        r"\bcreate (?:a )?file (?:called )?(.+)",
        "cursor_create_file",
        &[("file_name", 1)],
    ),
    (
        CommandType::ToolControl,
        r"\bsearch (?:for )?(.+?) in (?:files|project)\b",
        "cursor_search_files",
        &[("query", 1)],
    ),
    // Agent requests
    (
        CommandType::AgentRequest,
        r"\b(?:write|code|create) (?:a )?(.+?) (?:function|script|program)\b",
        "code_request",
        &[("description", 1)],
    ),
    (
        CommandType::AgentRequest,
        r"\b(?:browse|visit|go to) (.+)",
        "web_browse",
        &[("url", 1)],
    ),
    (
        CommandType::AgentRequest,
        r"\b(?:search|find|look up) (.+?) (?:on the web|online)\b",
        "web_search",
        &[("query", 1)],
    ),
    (
        CommandType::AgentRequest,
        r"\b(?:translate|convert) (.+?) (?:to|into) (.+)",
        "translate",
        &[("text", 1), ("target_language", 2)],
    ),
    // System control
    (
        CommandType::SystemControl,
        r"\b(?:start|begin) (?:listening|voice (?:mode|control))\b",
        "start_listening",
        &[],
    ),
    (
        CommandType::SystemControl,
        r"\b(?:stop|end|quit) (?:listening|voice (?:mode|control))\b",
        "stop_listening",
        &[],
    ),
    (
        CommandType::SystemControl,
        r"\b(?:set|change) voice (?:to )?(.+)",
        "change_voice",
        &[("voice_name", 1)],
    ),
    (
        CommandType::SystemControl,
        r"\b(?:set|change) (?:speech )?(?:rate|speed) (?:to )?(.+)",
        "change_speech_rate",
        &[("rate", 1)],
    ),
    (
        CommandType::SystemControl,
        r"\b(?:mute|unmute|silence)\b",
        "toggle_mute",
        &[],
    ),
    // Conversation
    (
        CommandType::Conversation,
        r"\b(?:hello|hi|hey)\b(?:\s+.+)?",
        "greeting",
        &[],
    ),
    (
        CommandType::Conversation,
        r"\b(?:thank you|thanks)\b(?:\s+.+)?",
        "thanks",
        &[],
    ),
    (
        CommandType::Conversation,
        r"\b(?:goodbye|bye|see you later)\b(?:\s+.+)?",
        "goodbye",
        &[],
    ),
    (
        CommandType::Conversation,
        r"\b(?:help|what can you do)\b",
        "help",
        &[],
    ),
];

const PRIORITY: [CommandType; 4] = [
    CommandType::ToolControl,
    CommandType::AgentRequest,
    CommandType::SystemControl,
    CommandType::Conversation,
];

fn compile_table() -> Vec<Pattern> {
    let mut patterns = Vec::with_capacity(TABLE.len());
    for kind in PRIORITY {
        for (row_kind, source, action, params) in TABLE {
            if *row_kind != kind {
                continue;
            }
            match Regex::new(&format!("(?i){}", source)) {
                Ok(regex) => patterns.push(Pattern {
                    kind,
                    regex,
                    action,
                    params,
                }),
                Err(e) => error!("❌ Invalid command pattern for '{}': {}", action, e),
            }
        }
    }
    patterns
}

lazy_static! {
    static ref PATTERNS: Vec<Pattern> = compile_table();
}

/// Regex-table command interpreter
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandInterpreter;

impl CommandInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Interpret one utterance. Never fails; unmatched text becomes a general query.
    pub fn parse(&self, text: &str) -> Command {
        let text = text.trim();

        for pattern in PATTERNS.iter() {
            let Some(caps) = pattern.regex.captures(text) else {
                continue;
            };

            let parameters = pattern
                .params
                .iter()
                .filter_map(|(name, group)| {
                    caps.get(*group)
                        .map(|m| (name.to_string(), m.as_str().trim().to_string()))
                })
                .collect();

            debug!("🎯 '{}' matched {} ({})", text, pattern.action, pattern.kind);
            return Command {
                kind: pattern.kind,
                action: pattern.action.to_string(),
                parameters,
                confidence: MATCHED_CONFIDENCE,
                timestamp: Utc::now(),
                original_text: text.to_string(),
            };
        }

        debug!("❓ No pattern matched '{}'", text);
        Command {
            kind: CommandType::Unknown,
            action: GENERAL_QUERY.to_string(),
            parameters: BTreeMap::from([("query".to_string(), text.to_string())]),
            confidence: UNMATCHED_CONFIDENCE,
            timestamp: Utc::now(),
            original_text: text.to_string(),
        }
    }

    /// Number of compiled patterns
    pub fn pattern_count(&self) -> usize {
        PATTERNS.len()
    }

    /// Distinct actions in matching order
    pub fn supported_actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<&'static str> = Vec::new();
        for pattern in PATTERNS.iter() {
            if !actions.contains(&pattern.action) {
                actions.push(pattern.action);
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Command {
        CommandInterpreter::new().parse(text)
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(CommandInterpreter::new().pattern_count(), TABLE.len());
    }

    #[test]
    fn test_open_file_in_cursor() {
        let cmd = parse("open main.py in cursor");
        assert_eq!(cmd.kind, CommandType::ToolControl);
        assert_eq!(cmd.action, "cursor_open_file");
        assert_eq!(cmd.param("file_path"), Some("main.py"));
        assert_eq!(cmd.parameters.len(), 1);
        assert_eq!(cmd.confidence, MATCHED_CONFIDENCE);
    }

    #[test]
    fn test_gibberish_is_unknown() {
        let input = "completely unrelated gibberish xyz";
        let cmd = parse(input);
        assert_eq!(cmd.kind, CommandType::Unknown);
        assert_eq!(cmd.action, GENERAL_QUERY);
        assert_eq!(cmd.confidence, UNMATCHED_CONFIDENCE);
        assert_eq!(cmd.param("query"), Some(input));
    }

    #[test]
    fn test_case_insensitive_keeps_capture_case() {
        let cmd = parse("Open README.md in Editor");
        assert_eq!(cmd.action, "cursor_open_file");
        assert_eq!(cmd.param("file_path"), Some("README.md"));
    }

    #[test]
    fn test_tool_control_beats_agent_request() {
        // Also matches the code_request shape, but tool control is checked first
        let cmd = parse("create a file called build script");
        assert_eq!(cmd.kind, CommandType::ToolControl);
        assert_eq!(cmd.action, "cursor_create_file");
        assert_eq!(cmd.param("file_name"), Some("build script"));
    }

    #[test]
    fn test_remember() {
        let cmd = parse("remember that the meeting is at noon");
        assert_eq!(cmd.action, "memory_save");
        assert_eq!(cmd.param("content"), Some("the meeting is at noon"));
    }

    #[test]
    fn test_watch_directory() {
        let cmd = parse("watch the src directory");
        assert_eq!(cmd.action, "file_watch");
        assert_eq!(cmd.param("path"), Some("src"));
    }

    #[test]
    fn test_search_in_project() {
        let cmd = parse("search for todo comments in project");
        assert_eq!(cmd.action, "cursor_search_files");
        assert_eq!(cmd.param("query"), Some("todo comments"));
    }

    #[test]
    fn test_agent_requests() {
        let cmd = parse("write a sorting function");
        assert_eq!(cmd.kind, CommandType::AgentRequest);
        assert_eq!(cmd.param("description"), Some("sorting"));

        let cmd = parse("go to example.com");
        assert_eq!(cmd.action, "web_browse");
        assert_eq!(cmd.param("url"), Some("example.com"));

        let cmd = parse("look up rust lifetimes online");
        assert_eq!(cmd.action, "web_search");
        assert_eq!(cmd.param("query"), Some("rust lifetimes"));

        let cmd = parse("translate good morning to French");
        assert_eq!(cmd.action, "translate");
        assert_eq!(cmd.param("text"), Some("good morning"));
        assert_eq!(cmd.param("target_language"), Some("French"));
    }

    #[test]
    fn test_system_control() {
        assert_eq!(parse("start listening").action, "start_listening");
        assert_eq!(parse("stop voice control").action, "stop_listening");
        assert_eq!(parse("mute").action, "toggle_mute");

        let cmd = parse("set speech rate to fast");
        assert_eq!(cmd.action, "change_speech_rate");
        assert_eq!(cmd.param("rate"), Some("fast"));

        let cmd = parse("change voice to female");
        assert_eq!(cmd.action, "change_voice");
        assert_eq!(cmd.param("voice_name"), Some("female"));
    }

    #[test]
    fn test_conversation() {
        assert_eq!(parse("hello there").action, "greeting");
        assert_eq!(parse("thanks a lot").action, "thanks");
        assert_eq!(parse("see you later").action, "goodbye");
        assert_eq!(parse("what can you do").action, "help");
        assert_eq!(parse("hello").kind, CommandType::Conversation);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        // "this" contains "hi" but is not a greeting
        assert!(parse("this is fine").is_unknown());
        assert_ne!(parse("that was helpful").action, "help");
        assert_eq!(parse("help").action, "help");
    }

    #[test]
    fn test_input_is_trimmed() {
        let cmd = parse("   what is the weather   ");
        assert_eq!(cmd.original_text, "what is the weather");
        assert_eq!(cmd.param("query"), Some("what is the weather"));
    }

    #[test]
    fn test_serializes_type_field() {
        let json = serde_json::to_value(parse("mute")).unwrap();
        assert_eq!(json["type"], "system_control");
        assert_eq!(json["action"], "toggle_mute");
    }

    #[test]
    fn test_supported_actions_unique() {
        let actions = CommandInterpreter::new().supported_actions();
        assert_eq!(actions.len(), TABLE.len());
        assert_eq!(actions[0], "cursor_open_file");
    }
}
