//! Tools callable from model output and voice commands.
//!
//! - [`extract`] finds embedded tool calls in free text
//! - [`registry`] maps tool names to implementations
//! - [`dispatch`] runs calls and aggregates per-call records

pub mod dispatch;
pub mod extract;
pub mod registry;

pub use dispatch::{DispatchReport, FailureKind, ToolCallRecord, ToolDispatcher, ToolOutcome};
pub use extract::{extract_tool_calls, ExtractedToolCall, Notation};
pub use registry::{FnTool, GatewayTool, ToolRegistry};

use crate::gateway::GatewayError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a tool invocation failed
#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A named operation with JSON arguments
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}
