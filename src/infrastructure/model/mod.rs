mod gemini;

pub use gemini::GeminiClient;

use crate::domain::types::ChatMessage;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: ChatMessage,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model endpoint returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the AI service. Check your network connection.".to_string()
                } else if err.is_timeout() {
                    "The AI service took too long to answer. Try again in a moment.".to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            "The AI service rejected the credential. Check the configured API key."
                                .to_string()
                        }
                        StatusCode::NOT_FOUND => {
                            "The configured model was not found at the AI endpoint.".to_string()
                        }
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            "The AI service is currently unavailable. Try again later.".to_string()
                        }
                        _ => format!(
                            "The request to the AI service failed with status {}.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while contacting the AI service.".to_string()
                }
            }
            ModelError::InvalidResponse(_) => {
                "The AI service returned a response that could not be processed.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
