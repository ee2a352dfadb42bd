//! Scripted provider
//!
//! A deterministic `LLMProvider` that replays queued responses instead of
//! calling a model. Tests use it to drive the agent loop through an exact
//! sequence of role outputs.
//!
//! Responses are routed by a substring of the system prompt (each role's
//! prompt opens with its own name), so a test can script the Planner and the
//! Actor independently. Calls that match no route pop from the default queue.

use super::{GenerationParams, LLMError, LLMProvider, Message, MessageRole, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

struct Route {
    needle: String,
    responses: VecDeque<Result<String>>,
    repeat_last: Option<Result<String>>,
}

#[derive(Default)]
struct ScriptState {
    routes: Vec<Route>,
    default: VecDeque<Result<String>>,
    /// (system, user) text of every call served
    calls: Vec<(String, String)>,
}

/// Provider that answers from a script
#[derive(Default)]
pub struct ScriptedProvider {
    state: Mutex<ScriptState>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses for calls whose system prompt contains `needle`
    pub fn on(self, needle: impl Into<String>, responses: Vec<Result<String>>) -> Self {
        self.lock().routes.push(Route {
            needle: needle.into(),
            responses: responses.into(),
            repeat_last: None,
        });
        self
    }

    /// Answer every call whose system prompt contains `needle` with the same response
    pub fn always(self, needle: impl Into<String>, response: Result<String>) -> Self {
        self.lock().routes.push(Route {
            needle: needle.into(),
            responses: VecDeque::new(),
            repeat_last: Some(response),
        });
        self
    }

    /// Queue a response for calls that match no route
    pub fn push(&self, response: Result<String>) {
        self.lock().default.push_back(response);
    }

    /// Total number of calls served
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of calls whose system prompt contained `needle`
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(system, _)| system.contains(needle))
            .count()
    }

    /// User prompts of the calls whose system prompt contained `needle`, in call order
    pub fn user_prompts_matching(&self, needle: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(system, _)| system.contains(needle))
            .map(|(_, user)| user.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[Message], _params: &GenerationParams) -> Result<String> {
        let text_of = |role: MessageRole| {
            messages
                .iter()
                .find(|m| m.role == role)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        };
        let system = text_of(MessageRole::System);

        let mut state = self.lock();
        state.calls.push((system.clone(), text_of(MessageRole::User)));

        if let Some(route) = state
            .routes
            .iter_mut()
            .find(|route| system.contains(&route.needle))
        {
            if let Some(next) = route.responses.pop_front() {
                return next;
            }
            if let Some(repeat) = &route.repeat_last {
                return repeat.clone();
            }
            return Err(LLMError::ProviderUnavailable(format!(
                "script for '{}' exhausted",
                route.needle
            )));
        }

        state.default.pop_front().unwrap_or_else(|| {
            Err(LLMError::ProviderUnavailable(
                "scripted provider has no response queued".to_string(),
            ))
        })
    }
}
