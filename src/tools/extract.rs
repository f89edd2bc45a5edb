//! Tool-call extraction from model output.
//!
//! Three notations are recognized, case-insensitively:
//!
//! ```text
//! TOOL_CALL: read_file(path="notes.txt", lines=20)
//! [TOOL: git_status]  or  [TOOL: git_log, args: {"limit": 5}]
//! use tool: list_directory with args {"path": "/tmp"}
//! ```
//!
//! Argument blocks are scanned with balanced delimiters, so nested JSON and
//! quoted parentheses are handled. Calls with an unterminated argument
//! block or unparseable JSON are skipped.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Which textual form a call was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notation {
    FunctionCall,
    Bracketed,
    Natural,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub notation: Notation,
    /// The matched source text
    pub raw: String,
    /// Byte offset of the match in the input
    #[serde(skip)]
    pub offset: usize,
}

lazy_static! {
    static ref FUNCTION_HEAD: Option<Regex> = Regex::new(r"(?i)TOOL_CALL:\s*(\w+)\s*\(").ok();
    static ref BRACKET_HEAD: Option<Regex> = Regex::new(r"(?i)\[TOOL:\s*(\w+)").ok();
    static ref BRACKET_ARGS: Option<Regex> = Regex::new(r"(?i)^,\s*args:\s*").ok();
    static ref NATURAL_HEAD: Option<Regex> = Regex::new(r"(?i)\buse\s+tool:\s*(\w+)").ok();
    static ref NATURAL_ARGS: Option<Regex> = Regex::new(r"(?i)^\s+with\s+args\s*").ok();
}

/// Extract every tool call, ordered by position in `text`.
///
/// Calls are not de-duplicated; the same call written twice is returned twice.
pub fn extract_tool_calls(text: &str) -> Vec<ExtractedToolCall> {
    let mut calls = Vec::new();
    scan(text, FUNCTION_HEAD.as_ref(), Notation::FunctionCall, &mut calls);
    scan(text, BRACKET_HEAD.as_ref(), Notation::Bracketed, &mut calls);
    scan(text, NATURAL_HEAD.as_ref(), Notation::Natural, &mut calls);
    calls.sort_by_key(|call| call.offset);
    calls
}

fn scan(
    text: &str,
    head: Option<&Regex>,
    notation: Notation,
    calls: &mut Vec<ExtractedToolCall>,
) {
    let Some(head) = head else {
        return;
    };

    let mut pos = 0;
    while pos < text.len() {
        let Some(caps) = head.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        let parsed = match notation {
            Notation::FunctionCall => parse_function_call(text, whole.end()),
            Notation::Bracketed => parse_bracketed(text, whole.end()),
            Notation::Natural => parse_natural(text, whole.end()),
        };

        match parsed {
            Some((arguments, end)) => {
                calls.push(ExtractedToolCall {
                    name: name.as_str().to_string(),
                    arguments,
                    notation,
                    raw: text[whole.start()..end].to_string(),
                    offset: whole.start(),
                });
                pos = end;
            }
            None => {
                debug!("Skipping malformed {:?} call to '{}'", notation, name.as_str());
                pos = whole.end();
            }
        }
    }
}

/// `args_start` is just past the opening parenthesis
fn parse_function_call(text: &str, args_start: usize) -> Option<(Map<String, Value>, usize)> {
    let quoting = if text[args_start..].trim_start().starts_with('{') {
        Quoting::Json
    } else {
        Quoting::KeyValue
    };
    let close = find_closing(text, args_start, '(', ')', quoting)?;
    let inner = text[args_start..close].trim();
    let arguments = if inner.starts_with('{') {
        parse_json_object(inner)?
    } else {
        parse_key_values(inner)
    };
    Some((arguments, close + 1))
}

fn parse_bracketed(text: &str, after_name: usize) -> Option<(Map<String, Value>, usize)> {
    let rest = &text[after_name..];
    let trimmed = rest.trim_start();
    if trimmed.starts_with(']') {
        let end = after_name + (rest.len() - trimmed.len()) + 1;
        return Some((Map::new(), end));
    }

    let args_label = BRACKET_ARGS.as_ref()?.find(rest)?;
    let (arguments, json_end) = parse_json_block(text, after_name + args_label.end())?;

    let tail = &text[json_end..];
    let tail_trimmed = tail.trim_start();
    if !tail_trimmed.starts_with(']') {
        return None;
    }
    Some((arguments, json_end + (tail.len() - tail_trimmed.len()) + 1))
}

fn parse_natural(text: &str, after_name: usize) -> Option<(Map<String, Value>, usize)> {
    let rest = &text[after_name..];
    match NATURAL_ARGS.as_ref().and_then(|re| re.find(rest)) {
        Some(label) => parse_json_block(text, after_name + label.end()),
        None => Some((Map::new(), after_name)),
    }
}

/// A JSON object starting exactly at `start`
fn parse_json_block(text: &str, start: usize) -> Option<(Map<String, Value>, usize)> {
    if !text[start..].starts_with('{') {
        return None;
    }
    let close = find_closing(text, start + 1, '{', '}', Quoting::Json)?;
    let arguments = parse_json_object(&text[start..=close])?;
    Some((arguments, close + 1))
}

fn parse_json_object(block: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// How string literals open inside an argument block
#[derive(Debug, Clone, Copy, PartialEq)]
enum Quoting {
    /// Only `"` opens a string
    Json,
    /// `"` or `'`, but only right after `=`, `(`, `,` or whitespace, so
    /// apostrophes inside bare words like `I'm` stay plain text
    KeyValue,
}

impl Quoting {
    fn opens(self, c: char, prev: Option<char>) -> bool {
        match self {
            Quoting::Json => c == '"',
            Quoting::KeyValue => {
                matches!(c, '"' | '\'')
                    && prev.map_or(true, |p| p.is_whitespace() || matches!(p, '=' | '(' | ','))
            }
        }
    }
}

/// Tracks whether the scan is inside a string literal
struct StringState {
    quoting: Quoting,
    quote: Option<char>,
    escaped: bool,
    prev: Option<char>,
}

impl StringState {
    fn new(quoting: Quoting) -> Self {
        Self {
            quoting,
            quote: None,
            escaped: false,
            prev: None,
        }
    }

    /// Feed one character; `true` when it belongs to a string literal
    fn consume(&mut self, c: char) -> bool {
        let prev = self.prev.replace(c);
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == q {
                self.quote = None;
            }
            return true;
        }
        if self.quoting.opens(c, prev) {
            self.quote = Some(c);
            return true;
        }
        false
    }
}

/// Byte index of the delimiter closing one already-open `open`, starting
/// the scan at `from`. String literals are skipped.
fn find_closing(
    text: &str,
    from: usize,
    open: char,
    close: char,
    quoting: Quoting,
) -> Option<usize> {
    let mut depth = 1usize;
    let mut strings = StringState::new(quoting);

    for (i, c) in text[from..].char_indices() {
        if strings.consume(c) {
            continue;
        }
        match c {
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// `key=value, key2="quoted, value"`; pairs without `=` are ignored
fn parse_key_values(inner: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    for part in split_top_level(inner) {
        let Some((key, value)) = part.split_once('=') else {
            if !part.trim().is_empty() {
                debug!("Ignoring positional tool argument '{}'", part.trim());
            }
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        arguments.insert(key.to_string(), coerce(value.trim()));
    }
    arguments
}

/// Split on commas that are outside quotes and brackets
fn split_top_level(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut strings = StringState::new(Quoting::KeyValue);
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        if strings.consume(c) {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

/// Quoted values stay strings. Bare `true`/`false` become booleans and bare
/// digit runs become integers.
pub fn coerce(value: &str) -> Value {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return Value::String(unescape(&value[1..value.len() - 1], q));
        }
    }

    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = value.parse::<i64>() {
            return Value::from(n);
        }
    }
    Value::String(value.to_string())
}

fn unescape(inner: &str, quote: char) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) if next == quote || next == '\\' => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
