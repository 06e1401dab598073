use super::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use crate::config::{ConfigError, ModelConfig};
use crate::domain::types::{ChatMessage, MessageRole};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

/// Client for the Gemini `generateContent` API. The credential is resolved
/// once, at construction, from the environment variable the config names.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: String,
    request_timeout: Duration,
}

impl GeminiClient {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        let api_key = config.credential()?;
        Ok(Self {
            http: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key,
            request_timeout: config.request_timeout,
        })
    }

    fn build_model_url(&self, model: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        format!("{base}/{model}:generateContent")
    }
}

#[async_trait]
impl ModelProvider for GeminiClient {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.build_model_url(&request.model);
        let payload = build_payload(&request);

        info!(
            model = request.model.as_str(),
            messages = request.messages.len(),
            "Sending request to model endpoint"
        );
        let response: GeminiResponse = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received response from model endpoint");

        let content = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .flat_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.text)
            .ok_or_else(|| ModelError::InvalidResponse("missing candidate text".into()))?;

        Ok(ModelResponse {
            message: ChatMessage::new(MessageRole::Assistant, content),
        })
    }
}

fn build_payload(request: &ModelRequest) -> Value {
    let (system_text, contents) = to_gemini_format(&request.messages);

    let mut payload = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_output_tokens,
            "responseMimeType": "application/json",
        }
    });

    if let Some(system) = system_text {
        payload["system_instruction"] = json!({
            "parts": [{"text": system}]
        });
    }

    payload
}

/// Splits system messages out (Gemini takes them as a separate instruction
/// block) and maps the rest onto the `user`/`model` content roles.
fn to_gemini_format(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => system_parts.push(message.content.clone()),
            MessageRole::User => contents.push(json!({
                "role": "user",
                "parts": [{"text": message.content}]
            })),
            MessageRole::Assistant => contents.push(json!({
                "role": "model",
                "parts": [{"text": message.content}]
            })),
        }
    }

    let system_text = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system_text, contents)
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
