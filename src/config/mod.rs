use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config/client.toml";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_TEMPERATURE: f64 = 0.1;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_TOOL_STEPS: usize = 8;

pub const STDIO_TRANSPORT: &str = "stdio";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("credential environment variable '{var}' is not set")]
    MissingCredential { var: String },
    #[error("temperature {value} is outside the [0, 1] range")]
    InvalidTemperature { value: f64 },
    #[error("max_output_tokens must be positive")]
    InvalidMaxOutputTokens,
    #[error("{field} must be positive")]
    InvalidTimeout { field: &'static str },
    #[error("duplicate server name '{name}' in configuration")]
    DuplicateServer { name: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::MissingCredential { var } => format!(
                "The model credential is missing. Set the {var} environment variable and restart."
            ),
            _ => "The configuration is invalid. Check the config file and try again.".to_string(),
        }
    }
}

/// Model endpoint settings. The credential itself is never stored in the
/// file; only the name of the environment variable holding it.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
}

impl ModelConfig {
    /// Reads the credential from the process environment. Called once, at
    /// provider construction.
    pub fn credential(&self) -> Result<String, ConfigError> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                var: self.api_key_env.clone(),
            })
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Launch spec for one MCP tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub transport: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub system_prompt: Option<String>,
    pub servers: Vec<ServerConfig>,
    pub max_tool_steps: usize,
    pub handshake_timeout: Duration,
    pub reply_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            system_prompt: None,
            servers: Vec::new(),
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            reply_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    endpoint: Option<String>,
    api_key_env: Option<String>,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
    request_timeout_secs: Option<u64>,
    system_prompt: Option<String>,
    max_tool_steps: Option<usize>,
    handshake_timeout_secs: Option<u64>,
    reply_timeout_secs: Option<u64>,
    #[serde(default)]
    servers: Vec<RawServer>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    name: String,
    #[serde(default = "default_transport")]
    transport: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    workdir: Option<String>,
}

fn default_transport() -> String {
    STDIO_TRANSPORT.to_string()
}

impl AppConfig {
    /// Loads configuration from `path`, or from the default location. A
    /// missing default file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return read_config(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        match read_config(default_path) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("Configuration file not found; using defaults");
                Ok(Self::default())
            }
            Err(other) => Err(other),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err(ConfigError::InvalidTemperature {
                value: self.model.temperature,
            });
        }
        if self.model.max_output_tokens == 0 {
            return Err(ConfigError::InvalidMaxOutputTokens);
        }
        if self.model.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "request_timeout_secs",
            });
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "handshake_timeout_secs",
            });
        }
        if self.reply_timeout.is_some_and(|budget| budget.is_zero()) {
            return Err(ConfigError::InvalidTimeout {
                field: "reply_timeout_secs",
            });
        }
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.clone()) {
                return Err(ConfigError::DuplicateServer {
                    name: server.name.clone(),
                });
            }
        }
        Ok(self)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading client configuration file");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let defaults = ModelConfig::default();
    let config = AppConfig {
        model: ModelConfig {
            model: parsed.model.unwrap_or(defaults.model),
            endpoint: parsed.endpoint.unwrap_or(defaults.endpoint),
            api_key_env: parsed.api_key_env.unwrap_or(defaults.api_key_env),
            temperature: parsed.temperature.unwrap_or(defaults.temperature),
            max_output_tokens: parsed.max_output_tokens.unwrap_or(defaults.max_output_tokens),
            request_timeout: parsed
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        },
        system_prompt: parsed.system_prompt,
        servers: parsed.servers.into_iter().map(ServerConfig::from).collect(),
        max_tool_steps: parsed.max_tool_steps.unwrap_or(DEFAULT_MAX_TOOL_STEPS),
        handshake_timeout: Duration::from_secs(
            parsed
                .handshake_timeout_secs
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        ),
        reply_timeout: parsed.reply_timeout_secs.map(Duration::from_secs),
    };
    config.validate()
}

impl From<RawServer> for ServerConfig {
    fn from(value: RawServer) -> Self {
        Self {
            name: value.name,
            transport: value.transport,
            command: PathBuf::from(value.command),
            args: value.args,
            env: value.env,
            workdir: value.workdir.map(PathBuf::from),
        }
    }
}
