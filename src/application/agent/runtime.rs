use super::context::ToolContext;
use super::directive::AgentDirective;
use super::errors::ToolError;
use crate::application::tooling::{DiscoveredTool, ToolInvoker, ToolSet};
use crate::infrastructure::model::ModelError;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ToolRuntime {
    toolset: ToolSet,
    index: HashMap<String, DiscoveredTool>,
    invoker: Arc<dyn ToolInvoker>,
}

impl ToolRuntime {
    pub fn new(toolset: ToolSet, invoker: Arc<dyn ToolInvoker>) -> Self {
        let index = toolset
            .tools
            .iter()
            .cloned()
            .map(|tool| (tool.name.to_lowercase(), tool))
            .collect();
        Self {
            toolset,
            index,
            invoker,
        }
    }

    pub fn context(&self) -> ToolContext {
        ToolContext::from(&self.toolset)
    }

    pub fn compose_system_instructions(&self, context: &ToolContext) -> String {
        let mut lines = vec![
            "You are an autonomous assistant that can call tools to solve user requests."
                .to_string(),
            "All responses must be valid JSON without commentary or code fences.".to_string(),
            "When you need to invoke a tool, respond with: {\"action\":\"call_tool\",\"tool\":\"tool_name\",\"input\":{...}}."
                .to_string(),
            "To obtain the list of available tools, call the special tool: {\"action\":\"call_tool\",\"tool\":\"list_tools\"}."
                .to_string(),
            "When you are ready to give the final answer to the user, respond with: {\"action\":\"final\",\"response\":\"...\"}."
                .to_string(),
        ];

        if context.is_empty() {
            lines.push("No additional tools are currently configured.".to_string());
            return lines.join(" ");
        }

        for guidance in &context.servers {
            lines.push(format!(
                "Server '{}' guidance: {}",
                guidance.server, guidance.instruction
            ));
        }

        if !context.tools.is_empty() {
            lines.push("Configured tools:".to_string());
            for descriptor in &context.tools {
                let mut line = format!("- {} (server: {})", descriptor.name, descriptor.server);
                if let Some(description) = &descriptor.description {
                    line.push_str(&format!(": {}", description));
                }
                if let Some(schema) = &descriptor.input_schema {
                    let compact = serde_json::to_string(schema).unwrap_or_default();
                    line.push_str(&format!(". Input schema: {}", compact));
                }
                lines.push(line);
            }
        }

        lines.join(" ")
    }

    pub fn initial_user_prompt(&self, prompt: String, context: &ToolContext) -> String {
        let mut payload = json!({
            "action": "user_request",
            "prompt": prompt,
        });

        if !context.is_empty() {
            if let Some(map) = payload.as_object_mut() {
                if let Ok(value) = serde_json::to_value(context) {
                    map.insert("tool_context".to_string(), value);
                }
            }
        }

        payload.to_string()
    }

    pub(crate) async fn execute(
        &self,
        tool_name: &str,
        input: Value,
    ) -> Result<ToolExecution, ToolError> {
        if tool_name.eq_ignore_ascii_case("list_tools") {
            let manifest = self.context();
            let output = serde_json::to_value(&manifest).unwrap_or(Value::Null);
            debug!("Agent requested tool catalogue via list_tools");
            return Ok(ToolExecution {
                tool: "list_tools".to_string(),
                success: true,
                input,
                output,
                message: Some(format!(
                    "{} configured tool(s) listed.",
                    manifest.tools.len()
                )),
            });
        }

        let key = tool_name.to_lowercase();
        let Some(tool) = self.index.get(&key).cloned() else {
            warn!(requested_tool = %tool_name, "Unknown tool requested by agent");
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        };

        let arguments = match input.clone() {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        debug!(tool = %tool.name, server = %tool.server, "Dispatching tool call");
        match self.invoker.invoke(&tool.server, &tool.name, arguments).await {
            Ok(result) => {
                let is_error = result
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let message = extract_tool_message(&result);
                let execution = ToolExecution {
                    tool: tool.name,
                    success: !is_error,
                    input,
                    output: result,
                    message,
                };
                info!(tool = %execution.tool, success = execution.success, "Tool executed");
                Ok(execution)
            }
            Err(source) => {
                warn!(tool = %tool.name, server = %tool.server, %source, "Tool execution failed");
                Err(ToolError::Execution {
                    tool: tool.name,
                    source,
                })
            }
        }
    }

    /// Parses the model reply into a directive. A reply that is not JSON at
    /// all is accepted as the final answer; a JSON object with a bad or
    /// missing action is a malformed model response.
    pub fn parse_agent_action(&self, content: &str) -> Result<AgentDirective, ModelError> {
        if let Some(value) = Self::extract_json(content) {
            self.parse_action_value(value)
        } else {
            Ok(AgentDirective::Final {
                response: content.trim().to_string(),
            })
        }
    }

    fn parse_action_value(&self, value: Value) -> Result<AgentDirective, ModelError> {
        match value {
            Value::Object(map) => {
                let Some(action) = map.get("action").and_then(Value::as_str) else {
                    return Err(ModelError::InvalidResponse(
                        "missing action field in agent response".into(),
                    ));
                };
                match action {
                    "call_tool" => {
                        let tool = map
                            .get("tool")
                            .or_else(|| map.get("tool_name"))
                            .or_else(|| map.get("name"))
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                ModelError::InvalidResponse(
                                    "call_tool action missing tool field".into(),
                                )
                            })?;
                        let input = map
                            .get("input")
                            .or_else(|| map.get("arguments"))
                            .cloned()
                            .unwrap_or(Value::Null);
                        Ok(AgentDirective::CallTool {
                            tool: tool.to_string(),
                            input,
                        })
                    }
                    "final" => {
                        let response = map
                            .get("response")
                            .or_else(|| map.get("answer"))
                            .or_else(|| map.get("content"))
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                ModelError::InvalidResponse(
                                    "final action missing response field".into(),
                                )
                            })?;
                        Ok(AgentDirective::Final {
                            response: response.to_string(),
                        })
                    }
                    other => Err(ModelError::InvalidResponse(format!(
                        "unknown action value: {other}"
                    ))),
                }
            }
            Value::String(text) => self.parse_agent_action(&text),
            other => Err(ModelError::InvalidResponse(format!(
                "unsupported response type: {other}"
            ))),
        }
    }

    fn extract_json(content: &str) -> Option<Value> {
        let trimmed = content.trim();

        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Some(value);
        }

        // Code-fenced reply
        if trimmed.starts_with("```") {
            let stripped = trimmed.trim_start_matches("```json");
            let stripped = stripped.trim_start_matches("```JSON");
            let stripped = stripped.trim_start_matches("```");
            if let Some(end) = stripped.rfind("```") {
                let slice = &stripped[..end];
                if let Ok(value) = serde_json::from_str::<Value>(slice.trim()) {
                    return Some(value);
                }
            }
        }

        // JSON object embedded in prose
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                let candidate = &trimmed[start..=end];
                if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                    return Some(value);
                }
            }
        }

        None
    }
}

pub(crate) struct ToolExecution {
    pub tool: String,
    pub success: bool,
    pub input: Value,
    pub output: Value,
    pub message: Option<String>,
}

fn extract_tool_message(result: &Value) -> Option<String> {
    if let Some(array) = result.get("content").and_then(Value::as_array) {
        for block in array {
            let is_text = block
                .get("type")
                .and_then(Value::as_str)
                .map(|value| value.eq_ignore_ascii_case("text"))
                .unwrap_or(false);
            if is_text {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }

    if let Some(structured) = result.get("structuredContent").and_then(Value::as_object) {
        if let Some(error) = structured.get("error").and_then(Value::as_object) {
            if let Some(message) = error.get("message").and_then(Value::as_str) {
                let trimmed = message.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    None
}
