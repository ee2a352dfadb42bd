//! Recording dispatcher
//!
//! A device backend that performs nothing. It records every action it is
//! given and answers with synthetic observations. Used for `--dry-run` and to
//! drive the agent loop in tests; failures and a stop signal can be scripted.

use async_trait::async_trait;
use sdk::{Action, ActionDispatcher, ActionError, Observation};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::skills::AppScanner;

#[derive(Default)]
struct Recorded {
    actions: Vec<Action>,
    failures: VecDeque<Option<ActionError>>,
    observations: usize,
}

#[derive(Default)]
pub struct RecordingDispatcher {
    state: Mutex<Recorded>,
    installed: Vec<String>,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packages reported by the `AppScanner` implementation
    pub fn with_installed<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.installed = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Outcomes for the next executions in order; `None` succeeds
    pub fn with_failures(self, failures: Vec<Option<ActionError>>) -> Self {
        self.lock().failures = failures.into();
        self
    }

    /// Raise `flag` once `count` actions have been dispatched
    pub fn with_cancel_after(mut self, count: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((count, flag));
        self
    }

    /// Every action executed so far, in order
    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_observation(state: &mut Recorded, description: String) -> Observation {
        state.observations += 1;
        Observation::new(format!("dry-run-{}", state.observations)).with_description(description)
    }
}

#[async_trait]
impl ActionDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn observe(&self) -> Result<Observation, ActionError> {
        let mut state = self.lock();
        Ok(Self::next_observation(&mut state, "initial screen".to_string()))
    }

    async fn execute(&self, action: &Action) -> Result<Observation, ActionError> {
        let mut state = self.lock();
        state.actions.push(action.clone());
        tracing::info!("[dry-run] {}", action);

        if let Some((count, flag)) = &self.cancel_after {
            if state.actions.len() >= *count {
                flag.store(true, Ordering::SeqCst);
            }
        }

        if let Some(Some(error)) = state.failures.pop_front() {
            return Err(error);
        }

        let mut observation = Self::next_observation(&mut state, format!("screen after {}", action));
        if let Some(package) = action.target_app() {
            observation = observation.with_foreground_app(package);
        }
        Ok(observation)
    }
}

#[async_trait]
impl AppScanner for RecordingDispatcher {
    async fn scan(&self) -> Result<Vec<String>, ActionError> {
        Ok(self.installed.clone())
    }
}
