//! Tool-server gateway.
//!
//! Each call launches the named server as a child process, writes one
//! JSON-RPC request line to its stdin, closes stdin and collects the
//! output. There is no persistent session; a call either yields the first
//! reply line or a [`GatewayError`].

pub mod descriptor;
pub mod protocol;

pub use descriptor::{DescriptorTable, ServerDescriptor};
pub use protocol::{JsonRpcRequest, RpcReply};

use crate::config::{default_descriptor_paths, Config};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default wall-clock limit for one call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest stdout excerpt carried by a malformed-response error
const EXCERPT_CHARS: usize = 200;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("unknown tool server: {0}")]
    UnknownServer(String),

    #[error("tool server '{server}' timed out after {}s", .after.as_secs_f32())]
    Timeout { server: String, after: Duration },

    #[error("tool server '{server}' exited with {}: {stderr}", exit_label(.code))]
    ServerError {
        server: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("tool server '{server}' sent no JSON-RPC reply: {output:?}")]
    MalformedResponse { server: String, output: String },

    #[error("failed to launch tool server '{server}': {message}")]
    Spawn { server: String, message: String },

    #[error("tool server '{server}' rejected {method}: {error}")]
    Rejected {
        server: String,
        method: String,
        error: Value,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// A tool advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Launches tool servers from a fixed descriptor table
#[derive(Debug, Clone)]
pub struct ToolServerGateway {
    table: DescriptorTable,
    default_timeout: Duration,
}

impl ToolServerGateway {
    pub fn new(table: DescriptorTable) -> Self {
        info!("🔌 Tool gateway ready with {} servers", table.len());
        Self {
            table,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Discover servers from the configured descriptor files
    pub fn from_config(config: &Config) -> Self {
        let paths = if config.descriptor_paths.is_empty() {
            default_descriptor_paths()
        } else {
            config.descriptor_paths.clone()
        };
        Self::new(DescriptorTable::load(&paths)).with_timeout(config.tool_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Names of every known server
    pub fn servers(&self) -> Vec<String> {
        self.table.names()
    }

    pub fn descriptor(&self, server: &str) -> Option<&ServerDescriptor> {
        self.table.get(server)
    }

    /// Invoke `tool` on `server` via `tools/call`
    pub async fn call(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<RpcReply, GatewayError> {
        self.send(server, JsonRpcRequest::tool_call(tool, arguments), timeout)
            .await
    }

    /// Arbitrary method call
    pub async fn request(
        &self,
        server: &str,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<RpcReply, GatewayError> {
        self.send(server, JsonRpcRequest::new(method, params), timeout)
            .await
    }

    /// Tools advertised by a server
    pub async fn list_tools(
        &self,
        server: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<RemoteTool>, GatewayError> {
        let reply = self
            .request(server, "tools/list", Value::Object(Default::default()), timeout)
            .await?;

        match reply {
            RpcReply::Result(result) => {
                let tools = result.get("tools").cloned().unwrap_or(Value::Array(vec![]));
                serde_json::from_value(tools).map_err(|e| GatewayError::MalformedResponse {
                    server: server.to_string(),
                    output: format!("invalid tools list: {}", e),
                })
            }
            RpcReply::Error(error) => Err(GatewayError::Rejected {
                server: server.to_string(),
                method: "tools/list".to_string(),
                error,
            }),
        }
    }

    async fn send(
        &self,
        server: &str,
        request: JsonRpcRequest,
        timeout: Option<Duration>,
    ) -> Result<RpcReply, GatewayError> {
        let descriptor = self
            .table
            .get(server)
            .ok_or_else(|| GatewayError::UnknownServer(server.to_string()))?;
        let timeout = timeout.unwrap_or(self.default_timeout);

        let line = request.to_line().map_err(|e| GatewayError::Spawn {
            server: server.to_string(),
            message: format!("cannot encode request: {}", e),
        })?;

        debug!(
            "🔧 {} → {} ({}s limit)",
            request.method,
            server,
            timeout.as_secs_f32()
        );

        let mut child = Command::new(descriptor.program())
            .args(descriptor.args())
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::Spawn {
                server: server.to_string(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let started = Instant::now();

        let exchange = async {
            if let Some(mut stdin) = stdin {
                // A server may exit without reading; its exit status decides the outcome
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    debug!("Writing request to {} failed: {}", server, e);
                }
                let _ = stdin.shutdown().await;
            }
            tokio::join!(read_pipe(stdout), read_pipe(stderr), child.wait())
        };

        let outcome = tokio::time::timeout(timeout, exchange).await;
        let (stdout, stderr, status) = match outcome {
            Ok(collected) => collected,
            Err(_) => {
                warn!("⏰ Tool server '{}' timed out, killing it", server);
                if let Err(e) = child.start_kill() {
                    debug!("Kill failed for {}: {}", server, e);
                }
                let _ = child.wait().await;
                return Err(GatewayError::Timeout {
                    server: server.to_string(),
                    after: timeout,
                });
            }
        };

        let status = status.map_err(|e| GatewayError::Spawn {
            server: server.to_string(),
            message: format!("wait failed: {}", e),
        })?;

        debug!(
            "Tool server '{}' finished in {:?} with {}",
            server,
            started.elapsed(),
            status
        );

        if !status.success() {
            return Err(GatewayError::ServerError {
                server: server.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        protocol::find_reply(&stdout).ok_or_else(|| GatewayError::MalformedResponse {
            server: server.to_string(),
            output: stdout.trim().chars().take(EXCERPT_CHARS).collect(),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Reading tool server output failed: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
