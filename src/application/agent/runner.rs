use super::directive::AgentDirective;
use super::errors::AgentError;
use super::models::{AgentOptions, AgentOutcome, TurnMessage};
use super::runtime::ToolRuntime;
use crate::application::engine::{ChatClient, ChatRequest};
use crate::application::normalize::tool_display_content;
use crate::application::tooling::{ToolInvoker, ToolSet};
use crate::infrastructure::model::ModelProvider;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The observe → decide → (call tool | answer) loop. One `run` produces one
/// turn transcript; the conversation itself lives in the chat client's
/// session store.
pub struct Agent<P: ModelProvider> {
    client: Arc<ChatClient<P>>,
    runtime: ToolRuntime,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(client: Arc<ChatClient<P>>, toolset: ToolSet, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            client,
            runtime: ToolRuntime::new(toolset, invoker),
        }
    }

    pub async fn run(
        &self,
        prompt: String,
        mut options: AgentOptions,
    ) -> Result<AgentOutcome, AgentError> {
        info!("Agent run started");
        let mut session_id = options.session_id.clone();
        let mut messages = vec![TurnMessage::User {
            content: prompt.clone(),
        }];

        let context = self.runtime.context();
        let instructions = self.runtime.compose_system_instructions(&context);
        let system_prompt = match options.system_prompt.take() {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{existing}\n\n{instructions}")
            }
            _ => instructions,
        };

        let mut next_prompt = self.runtime.initial_user_prompt(prompt, &context);
        let mut remaining_steps = options.max_steps;
        let mut system_prompt_to_send = Some(system_prompt);

        loop {
            debug!(
                session = session_id.as_deref(),
                remaining_steps, "Submitting agent turn to model provider"
            );
            let request = ChatRequest {
                prompt: next_prompt.clone(),
                system_prompt: system_prompt_to_send.take(),
                session_id: session_id.clone(),
            };

            let result = self.client.chat(request).await.map_err(AgentError::Model)?;
            session_id = Some(result.session_id.clone());

            match self.runtime.parse_agent_action(&result.content)? {
                AgentDirective::Final { response } => {
                    info!(
                        session_id = result.session_id.as_str(),
                        "Agent returned final response"
                    );
                    messages.push(TurnMessage::Assistant {
                        content: response.clone(),
                    });
                    return Ok(AgentOutcome {
                        session_id: result.session_id,
                        response,
                        messages,
                    });
                }
                AgentDirective::CallTool { tool, input } => {
                    if remaining_steps == 0 {
                        warn!("Agent exceeded max tool interactions");
                        return Err(AgentError::StepLimitExceeded {
                            limit: options.max_steps,
                        });
                    }
                    remaining_steps -= 1;
                    info!(tool = %tool, "Agent requested tool execution");
                    let execution = self.runtime.execute(&tool, input).await?;

                    messages.push(TurnMessage::ToolCall {
                        tool: execution.tool.clone(),
                        input: execution.input.clone(),
                    });
                    messages.push(TurnMessage::ToolResult {
                        tool: execution.tool.clone(),
                        success: execution.success,
                        content: tool_display_content(&execution.output),
                    });

                    next_prompt = json!({
                        "tool_result": {
                            "tool": execution.tool,
                            "input": execution.input,
                            "success": execution.success,
                            "output": execution.output,
                            "message": execution.message,
                        }
                    })
                    .to_string();
                }
            }
        }
    }
}
