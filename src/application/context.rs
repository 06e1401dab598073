use crate::application::agent::{Agent, AgentError, AgentOptions, TurnMessage};
use crate::application::bridge::TurnHandler;
use crate::application::engine::{ChatClient, ClientConfig};
use crate::application::tooling::ServerManager;
use crate::config::AppConfig;
use crate::infrastructure::model::GeminiClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// The fully wired agent runtime: model provider, connected tool servers,
/// session continuity. Built once, on the background worker, and owned there
/// for the rest of the process lifetime.
pub struct AppContext {
    agent: Agent<GeminiClient>,
    transport: Arc<ServerManager>,
    session_id: Option<String>,
    max_steps: usize,
}

impl AppContext {
    /// Reads the credential, spawns and handshakes every configured tool
    /// server, and assembles the agent. Construction failures are fatal for
    /// the bridge; there is no retry.
    pub async fn connect(config: AppConfig) -> Result<Self, AgentError> {
        let provider = GeminiClient::from_config(&config.model)?;
        let transport = Arc::new(ServerManager::new(
            config.servers.clone(),
            config.handshake_timeout,
        ));
        let toolset = transport.connect_all().await?;
        info!(
            servers = config.servers.len(),
            tools = toolset.tools.len(),
            "Tool discovery complete"
        );

        let mut client_config = ClientConfig::from(&config.model);
        if let Some(system) = config.system_prompt.clone() {
            client_config = client_config.with_system_prompt(system);
        }
        let client = Arc::new(ChatClient::new(provider, client_config));
        let agent = Agent::new(client, toolset, transport.clone());

        Ok(Self {
            agent,
            transport,
            session_id: None,
            max_steps: config.max_tool_steps,
        })
    }
}

#[async_trait]
impl TurnHandler for AppContext {
    async fn handle(&mut self, prompt: String) -> Result<Vec<TurnMessage>, AgentError> {
        let options = AgentOptions {
            system_prompt: None,
            session_id: self.session_id.clone(),
            max_steps: self.max_steps,
        };
        let outcome = self.agent.run(prompt, options).await?;
        self.session_id = Some(outcome.session_id.clone());
        Ok(outcome.messages)
    }

    async fn shutdown(&mut self) {
        self.transport.shutdown().await;
    }
}
