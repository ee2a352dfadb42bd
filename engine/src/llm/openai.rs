//! OpenAI-compatible chat-completions provider
//!
//! Works against any endpoint that speaks the `/chat/completions` wire format.
//! Screenshots travel as base64 `image_url` content parts. Sampling penalties
//! are only sent when the endpoint is known to accept them.

use super::{GenerationParams, LLMError, LLMProvider, Message, Result};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};

pub struct OpenAIProvider {
    config: OpenAIConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Build a provider that reads its key from `config.api_key_env` per call
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            config,
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build a provider with an explicit key
    pub fn with_api_key(config: OpenAIConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: Some(api_key.into()),
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env).map_err(|_| {
            LLMError::AuthenticationFailed(format!(
                "environment variable {} is not set",
                self.config.api_key_env
            ))
        })
    }

    async fn encode_message(&self, msg: &Message) -> Result<Value> {
        if msg.images.is_empty() {
            return Ok(json!({
                "role": msg.role.to_string(),
                "content": msg.content,
            }));
        }

        let mut parts = vec![json!({ "type": "text", "text": msg.content })];
        for path in &msg.images {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                LLMError::ProviderUnavailable(format!(
                    "cannot read screenshot {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", encoded) }
            }));
        }

        Ok(json!({
            "role": msg.role.to_string(),
            "content": parts,
        }))
    }

    /// Build the request body; exposed for tests
    pub(crate) fn build_payload(&self, messages: Vec<Value>, params: &GenerationParams) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        if self.config.supports_penalties {
            payload["frequency_penalty"] = json!(0.0);
            payload["presence_penalty"] = json!(0.0);
        }

        payload
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn check_health(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<String> {
        let api_key = self.api_key()?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut api_messages = Vec::with_capacity(messages.len());
        for msg in messages {
            api_messages.push(self.encode_message(msg).await?);
        }

        let payload = self.build_payload(api_messages, params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                408 | 429 => LLMError::Transport(format!("HTTP {}", status.as_u16())),
                s if s >= 500 => LLMError::Transport(format!("HTTP {}: {}", s, text)),
                s => LLMError::Rejected { status: s, body: text },
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::MalformedResponse(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::MalformedResponse("No message content in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_deterministic() {
        let provider = OpenAIProvider::with_api_key(OpenAIConfig::default(), "k");
        let payload = provider.build_payload(vec![], &GenerationParams::default());
        assert_eq!(payload["temperature"], json!(0.0));
        assert_eq!(payload["frequency_penalty"], json!(0.0));
        assert_eq!(payload["presence_penalty"], json!(0.0));
    }

    #[test]
    fn test_payload_omits_penalties_when_unsupported() {
        let config = OpenAIConfig {
            supports_penalties: false,
            ..OpenAIConfig::default()
        };
        let provider = OpenAIProvider::with_api_key(config, "k");
        let payload = provider.build_payload(vec![], &GenerationParams::default());
        assert!(payload.get("frequency_penalty").is_none());
        assert!(payload.get("presence_penalty").is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_authentication_failure() {
        let config = OpenAIConfig {
            api_key_env: "TAPWISE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..OpenAIConfig::default()
        };
        let provider = OpenAIProvider::new(config);
        let result = provider
            .generate(&[Message::user("hi")], &GenerationParams::default())
            .await;
        assert!(matches!(result, Err(LLMError::AuthenticationFailed(_))));
        assert!(!provider.check_health().await);
    }

    #[tokio::test]
    async fn test_text_only_message_uses_plain_content() {
        let provider = OpenAIProvider::with_api_key(OpenAIConfig::default(), "k");
        let encoded = provider.encode_message(&Message::user("hello")).await.unwrap();
        assert_eq!(encoded["content"], json!("hello"));
        assert_eq!(encoded["role"], json!("user"));
    }
}
