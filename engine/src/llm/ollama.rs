//! Ollama LLM Provider
//!
//! Local provider for vision-capable models served by Ollama, typically at
//! http://localhost:11434. Screenshots are sent in the per-message `images`
//! field as base64 strings.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationParams, LLMError, LLMProvider, Message, Result};

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llava:13b")
    model: String,

    /// HTTP client for API requests
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Model name to use (e.g., "llava:13b")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    /// Convert our Message format to Ollama's format
    async fn convert_messages(&self, messages: &[Message]) -> Result<Vec<OllamaMessage>> {
        let mut converted = Vec::with_capacity(messages.len());
        for msg in messages {
            let mut images = Vec::with_capacity(msg.images.len());
            for path in &msg.images {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    LLMError::ProviderUnavailable(format!(
                        "cannot read screenshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                images.push(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
            converted.push(OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
                images,
            });
        }
        Ok(converted)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }

    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<String> {
        let ollama_messages = self.convert_messages(messages).await?;

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}",
            self.model,
            ollama_messages.len(),
            ollama_messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>()
        );

        let request = OllamaRequest {
            model: self.model.clone(),
            messages: ollama_messages,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::Transport(format!("Ollama at {}: {}", self.base_url, e))
                }
            })?;

        tracing::debug!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                LLMError::Transport(format!("Ollama API error ({}): {}", status, error_text))
            } else {
                LLMError::Rejected {
                    status: status.as_u16(),
                    body: error_text,
                }
            });
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            LLMError::MalformedResponse(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(ollama_response.message.content)
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
