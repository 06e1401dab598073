use crate::config::ModelConfig;
use crate::domain::types::{ChatMessage, MessageRole};
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl ClientConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            temperature: 0.1,
            max_output_tokens: 1000,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f64, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }
}

impl From<&ModelConfig> for ClientConfig {
    fn from(value: &ModelConfig) -> Self {
        Self::new(value.model.clone()).with_sampling(value.temperature, value.max_output_tokens)
    }
}

#[derive(Debug)]
pub struct ChatRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatResult {
    pub content: String,
    pub session_id: String,
}

/// Conversation-keeping wrapper around a model provider. History lives in
/// memory only and dies with the process.
pub struct ChatClient<P: ModelProvider> {
    provider: P,
    config: ClientConfig,
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl<P: ModelProvider> ChatClient<P> {
    pub fn new(provider: P, config: ClientConfig) -> Self {
        Self {
            provider,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResult, ModelError> {
        let session_id = request.session_id.unwrap_or_else(new_session_id);
        let system = request
            .system_prompt
            .or_else(|| self.config.system_prompt.clone());

        let history = {
            let mut sessions = self.sessions.lock().await;
            sessions.entry(session_id.clone()).or_default().clone()
        };
        debug!(
            session_id = session_id.as_str(),
            history_count = history.len(),
            "Preparing chat request with prior history"
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = system.filter(|text| !text.trim().is_empty()) {
            messages.push(ChatMessage::new(MessageRole::System, system));
        }
        messages.extend(history);
        messages.push(ChatMessage::new(MessageRole::User, request.prompt.clone()));

        let response = self
            .provider
            .chat(ModelRequest {
                model: self.config.model.clone(),
                messages,
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            })
            .await?;
        info!(
            session_id = session_id.as_str(),
            "Received response from model provider"
        );

        let content = response.message.content.clone();
        self.persist_exchange(&session_id, request.prompt, response.message)
            .await;

        Ok(ChatResult {
            content,
            session_id,
        })
    }

    async fn persist_exchange(&self, session_id: &str, user_prompt: String, assistant: ChatMessage) {
        let mut sessions = self.sessions.lock().await;
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::new(MessageRole::User, user_prompt));
        history.push(assistant);
        debug!(
            session_id,
            total_messages = history.len(),
            "Persisted chat exchange to session history"
        );
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::model::ModelResponse;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingProvider {
        records: Arc<Mutex<Vec<ModelRequest>>>,
    }

    #[async_trait]
    impl ModelProvider for RecordingProvider {
        async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
            let mut lock = self.records.lock().await;
            lock.push(request.clone());
            Ok(ModelResponse {
                message: ChatMessage::new(MessageRole::Assistant, "ack"),
            })
        }
    }

    impl RecordingProvider {
        async fn records(&self) -> Vec<ModelRequest> {
            self.records.lock().await.clone()
        }
    }

    #[tokio::test]
    async fn generates_session_and_persists_history() {
        let provider = RecordingProvider::default();
        let client = ChatClient::new(
            provider.clone(),
            ClientConfig::new("gemini-2.5-flash-lite").with_system_prompt("be precise"),
        );

        let first = client
            .chat(ChatRequest {
                prompt: "hello".into(),
                system_prompt: None,
                session_id: None,
            })
            .await
            .expect("first call succeeds");

        let second = client
            .chat(ChatRequest {
                prompt: "next".into(),
                system_prompt: None,
                session_id: Some(first.session_id.clone()),
            })
            .await
            .expect("second call succeeds");

        assert_eq!(first.session_id, second.session_id);

        let records = provider.records().await;
        assert_eq!(records.len(), 2);

        let first_messages = &records[0].messages;
        assert_eq!(first_messages.len(), 2);
        assert_eq!(first_messages[0].role, MessageRole::System);

        let second_messages = &records[1].messages;
        assert_eq!(second_messages.len(), 4);
        assert_eq!(second_messages[1].role, MessageRole::User);
        assert_eq!(second_messages[2].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn sampling_parameters_reach_the_provider() {
        let provider = RecordingProvider::default();
        let client = ChatClient::new(
            provider.clone(),
            ClientConfig::new("gemini-2.5-flash-lite").with_sampling(0.4, 256),
        );

        client
            .chat(ChatRequest {
                prompt: "hello".into(),
                system_prompt: None,
                session_id: None,
            })
            .await
            .expect("call succeeds");

        let records = provider.records().await;
        assert_eq!(records[0].temperature, 0.4);
        assert_eq!(records[0].max_output_tokens, 256);
    }
}
