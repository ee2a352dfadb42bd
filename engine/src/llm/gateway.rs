//! Model Gateway
//!
//! The single entry point the agent roles use to reach a model. It owns the
//! timeout and retry policy:
//!
//! 1. Every attempt is bounded by `timeout`
//! 2. Transport failures and timeouts are retried up to `max_retries` times,
//!    sleeping `backoff * 2^attempt` between attempts
//! 3. A provider that exhausts its retries hands off to the next configured
//!    provider
//! 4. A well-formed rejection, an auth failure or a malformed body surfaces
//!    immediately: retrying or falling back would only hide a configuration error
//!
//! The gateway holds configuration only, so one instance is shared by every
//! concurrent task run.

use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::{GenerationParams, LLMError, LLMProvider, ModelResult, Prompt};
use crate::config::LLMConfig;
use std::sync::Arc;
use std::time::Duration;

/// Timeout and retry bounds for a single prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Model Gateway with bounded retry and ordered provider fallback
pub struct ModelGateway {
    providers: Vec<Arc<dyn LLMProvider>>,
    policy: RetryPolicy,
    params: GenerationParams,
}

impl ModelGateway {
    /// Create a gateway over providers tried in the given order
    pub fn new(
        providers: Vec<Arc<dyn LLMProvider>>,
        policy: RetryPolicy,
        params: GenerationParams,
    ) -> Self {
        Self {
            providers,
            policy,
            params,
        }
    }

    /// Build the providers named in the configuration
    pub fn from_config(config: &LLMConfig) -> Self {
        if config.temperature != 0.0 {
            tracing::warn!(
                "Temperature override {} in effect; model output is not deterministic",
                config.temperature
            );
        }

        let providers = config
            .provider_order()
            .iter()
            .filter_map(|name| -> Option<Arc<dyn LLMProvider>> {
                match name.as_str() {
                    "openai" => Some(Arc::new(OpenAIProvider::new(config.openai.clone()))),
                    "ollama" => Some(Arc::new(OllamaProvider::new(
                        config.ollama.base_url.clone(),
                        config.ollama.model.clone(),
                    ))),
                    other => {
                        tracing::warn!("Ignoring unknown provider '{}'", other);
                        None
                    }
                }
            })
            .collect();

        Self::new(
            providers,
            RetryPolicy {
                timeout: config.timeout(),
                max_retries: config.max_retries,
                backoff: config.retry_backoff(),
            },
            GenerationParams {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send a prompt and return the completion text or a typed failure
    pub async fn predict(&self, prompt: &Prompt) -> ModelResult {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No model providers configured".to_string(),
            ));
        }

        let messages = prompt.to_messages();
        let mut last_error = LLMError::ProviderUnavailable("no attempt made".to_string());

        for provider in &self.providers {
            let mut attempt: u32 = 0;
            loop {
                tracing::debug!(
                    provider = provider.name(),
                    attempt = attempt + 1,
                    "Calling model (timeout: {}s)",
                    self.policy.timeout.as_secs()
                );

                let result = tokio::time::timeout(
                    self.policy.timeout,
                    provider.generate(&messages, &self.params),
                )
                .await;

                let error = match result {
                    Ok(Ok(text)) => {
                        tracing::debug!("Provider {} succeeded", provider.name());
                        return Ok(text);
                    }
                    Ok(Err(e)) => e,
                    Err(_) => LLMError::Timeout,
                };

                if !error.is_retryable() {
                    tracing::warn!("Provider {} failed without retry: {}", provider.name(), error);
                    return Err(error);
                }

                if attempt >= self.policy.max_retries {
                    tracing::warn!(
                        "Provider {} exhausted {} retries: {}",
                        provider.name(),
                        self.policy.max_retries,
                        error
                    );
                    last_error = error;
                    break;
                }

                let delay = self.policy.delay_for(attempt);
                tracing::info!(
                    "Provider {} transport failure ({}), retrying in {}ms",
                    provider.name(),
                    error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }

        tracing::error!("All model providers exhausted");
        Err(last_error)
    }

    /// Check the health of all registered providers
    /// Returns a list of (provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name().to_string(), is_healthy));
        }
        results
    }
}
