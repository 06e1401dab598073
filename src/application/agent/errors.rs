use crate::application::tooling::ConnectionError;
use crate::config::ConfigError;
use crate::infrastructure::model::ModelError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool requested: {0}")]
    UnknownTool(String),
    #[error("tool '{tool}' failed: {source}")]
    Execution {
        tool: String,
        #[source]
        source: ConnectionError,
    },
}

impl ToolError {
    pub fn user_message(&self) -> String {
        match self {
            ToolError::UnknownTool(name) => {
                format!("Tool \"{name}\" is not available on any connected server.")
            }
            ToolError::Execution { tool, source } => {
                format!("Tool \"{tool}\" failed: {}", source.user_message())
            }
        }
    }
}

/// Umbrella error delivered to the synchronous caller. Whatever goes wrong in
/// the background context arrives here as a resolved failure; the worker
/// thread itself never unwinds across a request.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("agent exceeded the limit of {limit} tool interactions")]
    StepLimitExceeded { limit: usize },
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("no reply within {budget:?}")]
    Timeout { budget: Duration },
    #[error("failed to start background worker: {0}")]
    Startup(String),
    #[error("the background agent worker is no longer running")]
    Terminated,
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Config(err) => err.user_message(),
            AgentError::Connection(err) => err.user_message(),
            AgentError::Model(err) => err.user_message(),
            AgentError::Tool(err) => err.user_message(),
            AgentError::StepLimitExceeded { limit } => format!(
                "The assistant used more than {limit} tool calls without reaching an answer. Try a narrower question."
            ),
            AgentError::EmptyPrompt => "Please enter a message first.".to_string(),
            AgentError::Timeout { .. } => {
                "The assistant is taking longer than expected. The answer was abandoned.".to_string()
            }
            AgentError::Startup(_) => {
                "The assistant backend failed to start. Check the logs and restart.".to_string()
            }
            AgentError::Terminated => {
                "The assistant backend has stopped. Restart the application.".to_string()
            }
        }
    }
}
