//! Agent Core
//!
//! Entry point for a task. The intent matcher decides how it runs:
//!
//! 1. Fast path: a confident Delegation match opens the app's deep link and
//!    the task is done without any Planner, Actor, Evaluator or Recorder call
//! 2. Agent loop: everything else runs through the `Orchestrator`, guided by
//!    the matched skill's app, prompt hint and step list when there is one
//!
//! A fast-path deep link the device refuses falls back to the agent loop.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use sdk::{Action, ActionDispatcher};

use crate::conductor::{Orchestrator, RunLimits, RunReport, Task};
use crate::llm::ModelGateway;
use crate::skills::{AvailableAppMatch, ExecutionPlan, IntentMatcher, RelatedApp};

/// How a task ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Handed to an app through a deep link
    Delegated {
        task_id: String,
        skill_id: String,
        app: RelatedApp,
        uri: String,
        confidence: f64,
        strategy: String,
    },
    /// Ran through the agent loop
    Completed(RunReport),
}

pub struct AgentCore {
    gateway: Arc<ModelGateway>,
    dispatcher: Arc<dyn ActionDispatcher>,
    matcher: IntentMatcher,
    limits: RunLimits,
}

impl AgentCore {
    pub fn new(
        gateway: Arc<ModelGateway>,
        dispatcher: Arc<dyn ActionDispatcher>,
        matcher: IntentMatcher,
        limits: RunLimits,
    ) -> Self {
        Self {
            gateway,
            dispatcher,
            matcher,
            limits,
        }
    }

    pub fn matcher(&self) -> &IntentMatcher {
        &self.matcher
    }

    /// Run a task; `cancel` is the host's stop signal for this run
    pub async fn process_task(&self, task: Task, cancel: Arc<AtomicBool>) -> Outcome {
        let task = match self.matcher.plan(&task.request).await {
            ExecutionPlan::FastPath { matched, uri } if !cancel.load(Ordering::SeqCst) => {
                match self.delegate(&task, &matched, &uri).await {
                    Some(outcome) => return outcome,
                    None => guided(task, Some(&matched)),
                }
            }
            ExecutionPlan::FastPath { matched, .. } => guided(task, Some(&matched)),
            ExecutionPlan::AgentLoop { matched } => guided(task, matched.as_ref()),
        };

        let orchestrator = Orchestrator::new(
            self.gateway.clone(),
            self.dispatcher.clone(),
            self.limits,
        )
        .with_cancel_flag(cancel);

        Outcome::Completed(orchestrator.run(task).await)
    }

    async fn delegate(&self, task: &Task, matched: &AvailableAppMatch, uri: &str) -> Option<Outcome> {
        let action = Action::DeepLink {
            uri: uri.to_string(),
            package: Some(matched.app.package.clone()),
        };

        match self.dispatcher.execute(&action).await {
            Ok(_) => {
                info!(
                    "Delegated '{}' to {} via {}",
                    task.request,
                    matched.app.label(),
                    uri
                );
                Some(Outcome::Delegated {
                    task_id: task.id.clone(),
                    skill_id: matched.skill.id.clone(),
                    app: matched.app.clone(),
                    uri: uri.to_string(),
                    confidence: matched.confidence,
                    strategy: matched.strategy.clone(),
                })
            }
            Err(e) => {
                warn!(
                    "Delegation to {} failed ({}), running the agent loop instead",
                    matched.app.package, e
                );
                None
            }
        }
    }
}

/// Attach the matched skill's guidance to the task
fn guided(task: Task, matched: Option<&AvailableAppMatch>) -> Task {
    let Some(matched) = matched else {
        return task;
    };
    let mut task = task
        .with_preferred_app(matched.app.label())
        .with_guide_steps(matched.app.steps.clone());
    if let Some(hint) = &matched.skill.prompt_hint {
        task = task.with_skill_hint(hint.clone());
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{ExecutionType, Skill};
    use std::collections::HashMap;

    #[test]
    fn test_guided_task_carries_skill_context() {
        let matched = AvailableAppMatch {
            skill: Skill {
                id: "post".into(),
                name: "Post".into(),
                description: String::new(),
                keywords: vec![],
                prompt_hint: Some("Max 280 characters".into()),
                apps: vec![],
            },
            app: RelatedApp {
                package: "com.chirp".into(),
                name: "Chirp".into(),
                priority: 1,
                execution_type: ExecutionType::GuiAutomation,
                deep_link: None,
                steps: vec!["Tap compose".into()],
                description: None,
            },
            params: HashMap::new(),
            confidence: 0.6,
            strategy: "keyword".into(),
        };

        let task = guided(Task::new("post hello"), Some(&matched));
        assert_eq!(task.preferred_apps, vec!["Chirp (com.chirp)".to_string()]);
        assert_eq!(task.skill_hint.as_deref(), Some("Max 280 characters"));
        assert_eq!(task.guide_steps, vec!["Tap compose".to_string()]);

        let plain = guided(Task::new("x"), None);
        assert!(plain.preferred_apps.is_empty());
    }
}
