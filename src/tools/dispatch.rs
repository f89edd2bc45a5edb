//! Tool dispatch.
//!
//! Every extracted call yields exactly one [`ToolCallRecord`]: unknown
//! tools, tool errors and panics are recorded as failures and never stop
//! the rest of the batch.

use super::extract::{extract_tool_calls, ExtractedToolCall};
use super::registry::ToolRegistry;
use super::ToolError;
use crate::gateway::GatewayError;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest result excerpt shown by [`DispatchReport::render`]
const RENDER_EXCERPT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolNotFound,
    ToolExecutionError,
    UnknownServer,
    Timeout,
    ServerError,
    MalformedResponse,
}

impl FailureKind {
    fn of(error: &ToolError) -> Self {
        match error {
            ToolError::Gateway(gateway) => match gateway {
                GatewayError::UnknownServer(_) => FailureKind::UnknownServer,
                GatewayError::Timeout { .. } => FailureKind::Timeout,
                GatewayError::ServerError { .. } | GatewayError::Spawn { .. } => {
                    FailureKind::ServerError
                }
                GatewayError::MalformedResponse { .. } => FailureKind::MalformedResponse,
                GatewayError::Rejected { .. } => FailureKind::ToolExecutionError,
            },
            ToolError::Rejected(_) | ToolError::Other(_) => FailureKind::ToolExecutionError,
        }
    }
}

/// Result of one call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Success {
        result: Value,
    },
    Failure {
        kind: FailureKind,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}

/// Serializes as `{tool, args, success, result}` or
/// `{tool, args, success, kind, error, diagnostic}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: Map<String, Value>,
    pub success: bool,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolCallRecord {
    pub fn succeeded(tool: &str, args: Map<String, Value>, result: Value) -> Self {
        Self {
            tool: tool.to_string(),
            args,
            success: true,
            outcome: ToolOutcome::Success { result },
        }
    }

    pub fn failed(
        tool: &str,
        args: Map<String, Value>,
        kind: FailureKind,
        error: String,
        diagnostic: Option<String>,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            args,
            success: false,
            outcome: ToolOutcome::Failure {
                kind,
                error,
                diagnostic,
            },
        }
    }

    /// Short human-readable description of the outcome
    pub fn summary(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { result } => summarize(result),
            ToolOutcome::Failure { error, .. } => error.clone(),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ToolOutcome::Failure { kind, .. } => Some(*kind),
            ToolOutcome::Success { .. } => None,
        }
    }
}

/// Aggregate of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub tool_calls: Vec<ToolCallRecord>,
    pub has_tool_calls: bool,
    pub tool_count: usize,
}

impl DispatchReport {
    pub fn new(tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            has_tool_calls: !tool_calls.is_empty(),
            tool_count: tool_calls.len(),
            tool_calls,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.tool_calls.iter().filter(|r| !r.success).count()
    }

    /// `response` followed by a results section; unchanged when no tools ran
    pub fn render(&self, response: &str) -> String {
        if !self.has_tool_calls {
            return response.to_string();
        }

        let mut text = format!("{}\n\n🛠️ **TOOL EXECUTION RESULTS:**\n", response);
        for (i, record) in self.tool_calls.iter().enumerate() {
            text.push_str(&format!("\n**{}. {}:**\n", i + 1, record.tool));
            match &record.outcome {
                ToolOutcome::Failure { error, .. } => {
                    text.push_str(&format!("❌ Error: {}\n", error));
                }
                ToolOutcome::Success { result } => {
                    text.push_str(&format!("✅ {}\n", summarize(result)));
                }
            }
        }
        text
    }
}

/// One-line summary of a successful result
fn summarize(result: &Value) -> String {
    if let Some(message) = result.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    if let Some(results) = result.get("results").and_then(Value::as_array) {
        return format!("Found {} results", results.len());
    }
    if let Some(content) = result.get("content") {
        // Tool servers answer with [{"type": "text", "text": ...}]
        if let Some(text) = content
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
        {
            return match serde_json::from_str::<Value>(text) {
                Ok(inner @ Value::Object(_)) => summarize(&inner),
                _ => excerpt(text),
            };
        }
        let content = match content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return format!("Content: {}", excerpt(&content));
    }
    match result {
        Value::String(s) => excerpt(s),
        Value::Null => "Success".to_string(),
        other => format!("Success: {}", excerpt(&other.to_string())),
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= RENDER_EXCERPT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(RENDER_EXCERPT).collect();
        format!("{}...", cut)
    }
}

/// Runs tool calls against a registry
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Invoke one tool by name. Never fails; failures become records.
    pub async fn invoke(&self, tool_name: &str, args: Map<String, Value>) -> ToolCallRecord {
        let Some(tool) = self.registry.get(tool_name) else {
            warn!("⚠️ Tool '{}' not found", tool_name);
            return ToolCallRecord::failed(
                tool_name,
                args,
                FailureKind::ToolNotFound,
                format!("Tool '{}' not found", tool_name),
                None,
            );
        };

        debug!("🔧 Running tool '{}'", tool_name);
        let run = AssertUnwindSafe(tool.invoke(args.clone())).catch_unwind();
        match run.await {
            Ok(Ok(result)) => {
                info!("✅ Tool '{}' succeeded", tool_name);
                ToolCallRecord::succeeded(tool_name, args, result)
            }
            Ok(Err(e)) => {
                warn!("❌ Tool '{}' failed: {}", tool_name, e);
                let kind = FailureKind::of(&e);
                ToolCallRecord::failed(
                    tool_name,
                    args,
                    kind,
                    format!("Tool execution failed: {}", e),
                    Some(format!("{:?}", e)),
                )
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("❌ Tool '{}' panicked: {}", tool_name, message);
                ToolCallRecord::failed(
                    tool_name,
                    args,
                    FailureKind::ToolExecutionError,
                    format!("Tool execution failed: {}", message),
                    Some(format!("panic in tool '{}': {}", tool_name, message)),
                )
            }
        }
    }

    /// Run calls in order, one record per call
    pub async fn dispatch(&self, calls: &[ExtractedToolCall]) -> DispatchReport {
        let mut records = Vec::with_capacity(calls.len());
        for call in calls {
            records.push(self.invoke(&call.name, call.arguments.clone()).await);
        }
        let report = DispatchReport::new(records);
        if report.has_tool_calls {
            info!(
                "🛠️ Ran {} tool calls ({} failed)",
                report.tool_count,
                report.failure_count()
            );
        }
        report
    }

    /// Extract calls from model text and run them
    pub async fn process_text(&self, text: &str) -> DispatchReport {
        let calls = extract_tool_calls(text);
        self.dispatch(&calls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use serde_json::json;

    fn dispatcher() -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::sync("echo", "Echo", |args| {
            Ok(json!({"message": format!("echoed {}", args.len())}))
        })));
        registry.register(Arc::new(FnTool::sync("fail", "Always fails", |_| {
            anyhow::bail!("disk on fire")
        })));
        registry.register(Arc::new(FnTool::sync("explode", "Panics", |_| {
            panic!("kaboom")
        })));
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_unknown_tool_recorded() {
        let record = dispatcher().invoke("nope", Map::new()).await;
        assert!(!record.success);
        assert_eq!(record.failure_kind(), Some(FailureKind::ToolNotFound));
    }

    #[test]
    fn test_invoke_without_runtime_features() {
        let record = tokio_test::block_on(dispatcher().invoke("echo", Map::new()));
        assert_eq!(record.summary(), "echoed 0");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let report = dispatcher()
            .process_text("TOOL_CALL: echo(a=1) [TOOL: fail] use tool: echo")
            .await;
        assert!(report.has_tool_calls);
        assert_eq!(report.tool_count, 3);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(
            report.tool_calls[1].failure_kind(),
            Some(FailureKind::ToolExecutionError)
        );
        assert!(report.tool_calls[2].success);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let report = dispatcher()
            .process_text("[TOOL: explode] [TOOL: echo]")
            .await;
        assert_eq!(report.tool_count, 2);
        assert!(!report.tool_calls[0].success);
        match &report.tool_calls[0].outcome {
            ToolOutcome::Failure { error, diagnostic, .. } => {
                assert!(error.contains("kaboom"));
                assert!(diagnostic.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(report.tool_calls[1].success);
    }

    #[tokio::test]
    async fn test_record_serialization() {
        let d = dispatcher();
        let ok = serde_json::to_value(d.invoke("echo", Map::new()).await).unwrap();
        assert_eq!(ok["tool"], "echo");
        assert_eq!(ok["success"], true);
        assert_eq!(ok["result"]["message"], "echoed 0");
        assert!(ok.get("error").is_none());

        let bad = serde_json::to_value(d.invoke("fail", Map::new()).await).unwrap();
        assert_eq!(bad["success"], false);
        assert_eq!(bad["kind"], "tool_execution_error");
        assert!(bad["error"].as_str().unwrap().contains("disk on fire"));
        assert!(bad.get("diagnostic").is_some());
        assert!(bad.get("result").is_none());
    }

    #[tokio::test]
    async fn test_empty_report() {
        let report = dispatcher().process_text("no tools here").await;
        assert!(!report.has_tool_calls);
        assert_eq!(report.tool_count, 0);
        assert_eq!(report.render("plain answer"), "plain answer");
    }

    #[tokio::test]
    async fn test_render() {
        let report = dispatcher()
            .process_text("[TOOL: echo] [TOOL: fail]")
            .await;
        let text = report.render("Done.");
        assert!(text.starts_with("Done.\n\n🛠️ **TOOL EXECUTION RESULTS:**\n"));
        assert!(text.contains("**1. echo:**\n✅ echoed 0\n"));
        assert!(text.contains("**2. fail:**\n❌ Error: Tool execution failed: disk on fire"));
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&json!({"results": [1, 2]})), "Found 2 results");
        assert_eq!(summarize(&json!("plain")), "plain");
        let long = "x".repeat(300);
        assert!(summarize(&json!({"content": long})).ends_with("..."));
        assert_eq!(
            summarize(&json!({"content": [{"type": "text", "text": "{\"message\": \"File opened\"}"}]})),
            "File opened"
        );
        assert_eq!(
            summarize(&json!({"content": [{"type": "text", "text": "saved"}]})),
            "saved"
        );
    }

    #[test]
    fn test_gateway_failure_kinds() {
        let err = ToolError::Gateway(GatewayError::Timeout {
            server: "s".into(),
            after: std::time::Duration::from_secs(1),
        });
        assert_eq!(FailureKind::of(&err), FailureKind::Timeout);
        let err = ToolError::Gateway(GatewayError::UnknownServer("s".into()));
        assert_eq!(FailureKind::of(&err), FailureKind::UnknownServer);
    }
}
