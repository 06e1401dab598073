use async_trait::async_trait;
use serde_json::Value;

use super::error::ConnectionError;

/// One callable operation discovered on a tool server.
#[derive(Debug, Clone)]
pub struct DiscoveredTool {
    pub server: String,
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

/// Free-form usage guidance a server advertises in its `initialize` result.
#[derive(Debug, Clone)]
pub struct ServerGuidance {
    pub server: String,
    pub instruction: String,
}

/// Everything the agent learns from connecting to the configured servers.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    pub tools: Vec<DiscoveredTool>,
    pub guidance: Vec<ServerGuidance>,
}

impl ToolSet {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Invocation seam between the agent runtime and the tool servers. Stubbed
/// in tests.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, ConnectionError>;
}
