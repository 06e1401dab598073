use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("tool server '{server}' is not configured")]
    NotConfigured { server: String },
    #[error("tool server '{server}' requested unsupported transport '{transport}'")]
    UnsupportedTransport { server: String, transport: String },
    #[error("failed to spawn tool server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool server '{server}' did not complete the handshake within {timeout_secs}s")]
    Handshake { server: String, timeout_secs: u64 },
    #[error("tool server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("tool server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("tool server '{server}' terminated unexpectedly")]
    Terminated { server: String },
    #[error("request to tool server '{server}' was cancelled")]
    Cancelled { server: String },
}

impl ConnectionError {
    pub fn user_message(&self) -> String {
        match self {
            ConnectionError::NotConfigured { server }
            | ConnectionError::UnsupportedTransport { server, .. } => {
                format!("Tool server \"{server}\" is not configured correctly.")
            }
            ConnectionError::Spawn { server, .. }
            | ConnectionError::Handshake { server, .. } => {
                format!("Tool server \"{server}\" could not be started. Check that it is installed and reachable.")
            }
            ConnectionError::Terminated { server } => {
                format!("Tool server \"{server}\" stopped unexpectedly.")
            }
            ConnectionError::Transport { server, .. }
            | ConnectionError::InvalidJson { server, .. }
            | ConnectionError::Rpc { server, .. }
            | ConnectionError::Cancelled { server } => {
                format!("Communication with tool server \"{server}\" failed.")
            }
        }
    }
}
