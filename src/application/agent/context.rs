use crate::application::tooling::ToolSet;
use serde::Serialize;
use serde_json::Value;

/// Serializable view of the discovered tool set, embedded in the first user
/// payload so the model knows what it may call.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ToolContext {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<GuidanceEntry>,
}

impl ToolContext {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.servers.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuidanceEntry {
    pub server: String,
    pub instruction: String,
}

impl From<&ToolSet> for ToolContext {
    fn from(toolset: &ToolSet) -> Self {
        Self {
            tools: toolset
                .tools
                .iter()
                .map(|tool| ToolDescriptor {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    server: tool.server.clone(),
                    input_schema: tool.input_schema.clone(),
                })
                .collect(),
            servers: toolset
                .guidance
                .iter()
                .map(|guidance| GuidanceEntry {
                    server: guidance.server.clone(),
                    instruction: guidance.instruction.clone(),
                })
                .collect(),
        }
    }
}
