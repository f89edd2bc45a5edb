//! Line-delimited JSON-RPC messages exchanged with tool servers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every process handles exactly one request, so the id never varies
pub const REQUEST_ID: u64 = 1;

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: REQUEST_ID,
            method: method.into(),
            params,
        }
    }

    /// `tools/call` for the named tool
    pub fn tool_call(tool: &str, arguments: Value) -> Self {
        Self::new(
            "tools/call",
            serde_json::json!({ "name": tool, "arguments": arguments }),
        )
    }

    /// Serialized form written to the server's stdin, newline-terminated
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// The payload of the first reply line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcReply {
    Result(Value),
    Error(Value),
}

impl RpcReply {
    pub fn is_error(&self) -> bool {
        matches!(self, RpcReply::Error(_))
    }

    pub fn value(&self) -> &Value {
        match self {
            RpcReply::Result(v) | RpcReply::Error(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            RpcReply::Result(v) | RpcReply::Error(v) => v,
        }
    }

    /// Human-readable error text for an `Error` reply
    pub fn error_message(&self) -> Option<String> {
        match self {
            RpcReply::Result(_) => None,
            RpcReply::Error(v) => Some(
                v.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| v.to_string()),
            ),
        }
    }
}

/// Parse one output line as a reply. `result` takes precedence over `error`.
pub fn parse_reply_line(line: &str) -> Option<RpcReply> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let mut object = match value {
        Value::Object(map) => map,
        _ => return None,
    };
    if let Some(result) = object.remove("result") {
        return Some(RpcReply::Result(result));
    }
    object.remove("error").map(RpcReply::Error)
}

/// First line of process output carrying a reply
pub fn find_reply(stdout: &str) -> Option<RpcReply> {
    stdout.lines().find_map(parse_reply_line)
}
