use super::error::ConnectionError;
use super::interface::{ServerGuidance, ToolInvoker, ToolSet};
use super::process::McpProcess;
use crate::config::{STDIO_TRANSPORT, ServerConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Owns the configured tool-server subprocesses. Connection happens once at
/// startup via [`connect_all`](ServerManager::connect_all); afterwards the
/// manager serves invocations and, eventually, teardown.
pub struct ServerManager {
    configs: Vec<ServerConfig>,
    handshake_timeout: Duration,
    instances: Mutex<HashMap<String, McpProcess>>,
}

impl ServerManager {
    pub fn new(configs: Vec<ServerConfig>, handshake_timeout: Duration) -> Self {
        Self {
            configs,
            handshake_timeout,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns every configured server, runs the listing handshake, and merges
    /// the discovered tools. Any failure aborts the whole connect; launch-spec
    /// violations (non-stdio transport) fail before anything is spawned.
    pub async fn connect_all(&self) -> Result<ToolSet, ConnectionError> {
        for config in &self.configs {
            if config.transport != STDIO_TRANSPORT {
                return Err(ConnectionError::UnsupportedTransport {
                    server: config.name.clone(),
                    transport: config.transport.clone(),
                });
            }
        }

        let mut toolset = ToolSet::default();
        let mut seen_tools: HashSet<String> = HashSet::new();

        for config in &self.configs {
            let process = self.process_for(config);
            process.ensure_running().await?;

            if let Some(instruction) = process.instructions().await {
                toolset.guidance.push(ServerGuidance {
                    server: config.name.clone(),
                    instruction,
                });
            }

            let tools = process.tools().await;
            info!(
                server = %config.name,
                tools = tools.len(),
                "Connected to tool server"
            );
            for tool in tools {
                if seen_tools.insert(tool.name.to_lowercase()) {
                    toolset.tools.push(tool);
                } else {
                    warn!(
                        server = %config.name,
                        tool = %tool.name,
                        "duplicate tool name; keeping the first registration"
                    );
                }
            }
        }

        Ok(toolset)
    }

    /// Kills every running server process. Safe to call more than once.
    pub async fn shutdown(&self) {
        let processes: Vec<McpProcess> = {
            let instances = self.instances.lock().expect("server registry lock");
            instances.values().cloned().collect()
        };
        for process in processes {
            process.shutdown().await;
        }
    }

    fn process_for(&self, config: &ServerConfig) -> McpProcess {
        let mut instances = self.instances.lock().expect("server registry lock");
        instances
            .entry(config.name.clone())
            .or_insert_with(|| McpProcess::new(config.clone(), self.handshake_timeout))
            .clone()
    }

    fn lookup(&self, server: &str) -> Result<McpProcess, ConnectionError> {
        if server.is_empty() {
            return Err(ConnectionError::NotConfigured {
                server: server.to_string(),
            });
        }
        let instances = self.instances.lock().expect("server registry lock");
        instances
            .get(server)
            .cloned()
            .ok_or_else(|| ConnectionError::NotConfigured {
                server: server.to_string(),
            })
    }
}

#[async_trait]
impl ToolInvoker for ServerManager {
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, ConnectionError> {
        let process = self.lookup(server)?;
        process.call_tool(tool, arguments).await
    }
}
