//! Flat tool registry.
//!
//! Tools from every family share one namespace; registering a name twice
//! replaces the earlier tool.

use super::{Tool, ToolError};
use crate::config::ToolRoute;
use crate::gateway::{RpcReply, ToolServerGateway};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type ToolFn = dyn Fn(Map<String, Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// Tool backed by a closure
pub struct FnTool {
    name: String,
    description: String,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(name: &str, description: &str, func: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            func: Box::new(move |args| func(args).boxed()),
        }
    }

    /// Wrap a synchronous closure
    pub fn sync<F>(name: &str, description: &str, func: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, description, move |args| {
            let func = Arc::clone(&func);
            async move { func(&args) }
        })
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        Ok((self.func)(arguments).await?)
    }
}

/// Tool that forwards to a tool server through the gateway
pub struct GatewayTool {
    name: String,
    description: String,
    server: String,
    remote_name: String,
    gateway: Arc<ToolServerGateway>,
    timeout: Option<Duration>,
}

impl GatewayTool {
    pub fn new(
        name: &str,
        gateway: Arc<ToolServerGateway>,
        server: &str,
        remote_name: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: format!("{} on {}", remote_name, server),
            server: server.to_string(),
            remote_name: remote_name.to_string(),
            gateway,
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl Tool for GatewayTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let reply = self
            .gateway
            .call(
                &self.server,
                &self.remote_name,
                Value::Object(arguments),
                self.timeout,
            )
            .await?;

        match reply {
            RpcReply::Result(value) => Ok(value),
            error @ RpcReply::Error(_) => Err(ToolError::Rejected(
                error.error_message().unwrap_or_default(),
            )),
        }
    }
}

/// Name → tool map shared by the dispatcher and the voice handler
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; an existing tool with the same name is replaced
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!("Tool '{}' re-registered, last registration wins", name);
        }
    }

    /// Register a whole family of tools in order
    pub fn register_all<I>(&mut self, tools: I)
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        for tool in tools {
            self.register(tool);
        }
    }

    /// One [`GatewayTool`] per configured route, named after the route key
    pub fn register_routes(
        &mut self,
        gateway: &Arc<ToolServerGateway>,
        routes: &HashMap<String, ToolRoute>,
    ) -> usize {
        let mut added = 0;
        for (name, route) in routes {
            if gateway.descriptor(&route.server).is_none() {
                debug!(
                    "Route '{}' points at unknown server '{}', registering anyway",
                    name, route.server
                );
            }
            self.register(Arc::new(GatewayTool::new(
                name,
                Arc::clone(gateway),
                &route.server,
                &route.tool,
            )));
            added += 1;
        }
        added
    }

    /// Ask every known server for its tools and register them by their own names.
    ///
    /// Servers that fail to answer are logged and skipped.
    pub async fn discover(&mut self, gateway: &Arc<ToolServerGateway>) -> usize {
        let mut added = 0;
        for server in gateway.servers() {
            match gateway.list_tools(&server, None).await {
                Ok(remote) => {
                    for tool in remote {
                        let mut local = GatewayTool::new(
                            &tool.name,
                            Arc::clone(gateway),
                            &server,
                            &tool.name,
                        );
                        if !tool.description.is_empty() {
                            local = local.with_description(&tool.description);
                        }
                        self.register(Arc::new(local));
                        added += 1;
                    }
                }
                Err(e) => warn!("⚠️ Could not list tools on '{}': {}", server, e),
            }
        }
        info!("🧰 Discovered {} remote tools", added);
        added
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Name → description for every tool
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    /// Prompt text teaching a model how to call the registered tools
    pub fn usage_instructions(&self) -> String {
        let mut text = String::from(
            "TOOL USAGE INSTRUCTIONS:\n\n\
             To use tools, include tool calls in your response using this format:\n\
             TOOL_CALL: tool_name(arg1=\"value1\", arg2=\"value2\")\n\n\
             Also accepted:\n\
             [TOOL: tool_name, args: {\"arg1\": \"value1\"}]\n\
             use tool: tool_name with args {\"arg1\": \"value1\"}\n\n\
             Available tools:\n",
        );
        for (name, description) in self.descriptions() {
            if description.is_empty() {
                text.push_str(&format!("- {}\n", name));
            } else {
                text.push_str(&format!("- {}: {}\n", name, description));
            }
        }
        text.push_str(
            "\nIMPORTANT:\n\
             1. Always use actual file paths, not made-up ones\n\
             2. Tool calls will be executed automatically\n\
             3. You will receive the actual results\n",
        );
        text
    }
}
