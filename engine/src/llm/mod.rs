//! Model Gateway and provider abstraction
//!
//! This module provides a common interface for reaching a vision-capable chat
//! model (OpenAI-compatible endpoints, Ollama). The `LLMProvider` trait is the
//! per-provider contract; `gateway::ModelGateway` layers timeout, retry with
//! backoff and provider fallback on top and is the only thing the agent roles
//! talk to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod gateway;
pub mod ollama;
pub mod openai;
pub mod scripted;

pub use gateway::ModelGateway;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Outcome of a single gateway prediction: the completion text or a typed failure
pub type ModelResult = Result<String>;

/// Errors that can occur during model operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote capability answered with a well-formed error
    #[error("Request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout")]
    Timeout,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl LLMError {
    /// Only network-level failures are worth repeating with identical input
    pub fn is_retryable(&self) -> bool {
        matches!(self, LLMError::Timeout | LLMError::Transport(_))
    }
}

impl From<LLMError> for sdk::EngineError {
    fn from(e: LLMError) -> Self {
        match e {
            LLMError::Timeout => sdk::EngineError::ModelTimeout,
            other => sdk::EngineError::ModelProvider(other.to_string()),
        }
    }
}

/// Message in a chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Text content of the message
    pub content: String,

    /// PNG screenshots attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PathBuf>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Attach screenshots to the message
    pub fn with_images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Structured prompt handed to the gateway: one system and one user turn
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub images: Vec<PathBuf>,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, path: PathBuf) -> Self {
        self.images.push(path);
        self
    }

    pub fn to_messages(&self) -> Vec<Message> {
        vec![
            Message::system(&self.system),
            Message::user(&self.user).with_images(self.images.clone()),
        ]
    }
}

/// Fixed generation parameters applied to every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Model provider trait that all providers must implement
///
/// Implementations hold only configuration and an HTTP client; they must be
/// safe to call concurrently from independent task runs.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai", "ollama")
    fn name(&self) -> &str;

    /// Generate a completion for the conversation
    ///
    /// # Returns
    /// * `Ok(String)` - The completion text
    /// * `Err(LLMError)` - Typed failure; the gateway decides whether to retry
    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<String>;

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

/// Strip the one wrapper models habitually add around JSON: a markdown fence.
///
/// Accepts raw JSON or a single fenced block (optionally tagged `json`) with
/// nothing but whitespace around it. Anything else is rejected as
/// `MalformedResponse`; no scanning for braces inside prose.
pub fn extract_json_payload(content: &str) -> Result<&str> {
    let trimmed = content.trim();

    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            let rest = rest
                .strip_suffix("```")
                .ok_or_else(|| LLMError::MalformedResponse("unterminated code fence".into()))?;
            rest.trim()
        }
        None => trimmed,
    };

    if body.starts_with('{') && body.ends_with('}') {
        Ok(body)
    } else {
        Err(LLMError::MalformedResponse(format!(
            "expected a JSON object, got: {}",
            truncate(body, 80)
        )))
    }
}

/// Truncate text for log and error messages on a char boundary
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
