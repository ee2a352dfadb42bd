//! Conductor Types
//!
//! Data shared across the agent loop: the immutable task, verdicts, history
//! records, run state and the report produced when a run ends.

use chrono::{DateTime, Utc};
use sdk::{Action, EngineError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A natural-language request, immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub request: String,

    /// Apps the agent should prefer, as "Name (package)" strings
    #[serde(default)]
    pub preferred_apps: Vec<String>,

    /// Extra instruction from the matched skill, injected into Actor prompts
    #[serde(default)]
    pub skill_hint: Option<String>,

    /// Step list from a GUI-automation skill
    #[serde(default)]
    pub guide_steps: Vec<String>,
}

impl Task {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request: request.into(),
            preferred_apps: Vec::new(),
            skill_hint: None,
            guide_steps: Vec::new(),
        }
    }

    pub fn with_preferred_app(mut self, app: impl Into<String>) -> Self {
        self.preferred_apps.push(app.into());
        self
    }

    pub fn with_skill_hint(mut self, hint: impl Into<String>) -> Self {
        self.skill_hint = Some(hint.into());
        self
    }

    pub fn with_guide_steps(mut self, steps: Vec<String>) -> Self {
        self.guide_steps = steps;
        self
    }
}

/// Outcome of an action as judged by the Evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Failure,
    /// Unexpected app state (popup, crash, navigation away) that needs a re-plan
    Anomaly,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::Failure => write!(f, "failure"),
            Verdict::Anomaly => write!(f, "anomaly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub rationale: String,
}

impl Evaluation {
    pub fn new(verdict: Verdict, rationale: impl Into<String>) -> Self {
        Self {
            verdict,
            rationale: rationale.into(),
        }
    }

    pub fn success(rationale: impl Into<String>) -> Self {
        Self::new(Verdict::Success, rationale)
    }

    pub fn failure(rationale: impl Into<String>) -> Self {
        Self::new(Verdict::Failure, rationale)
    }

    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }
}

/// One dispatched action as kept in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: Action,
    pub target: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(action: Action) -> Self {
        let target = action.target_app().map(str::to_string);
        Self {
            action,
            target,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle of a run: `Idle -> Running -> {Finished, Failed, Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Finished | RunState::Failed | RunState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match self {
            RunState::Idle => matches!(next, RunState::Running | RunState::Cancelled),
            RunState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Finished => "finished",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("Step budget of {limit} exceeded before the task finished")]
    StepBudgetExceeded { limit: usize },

    #[error("{count} consecutive step failures, last: {last_error}")]
    ConsecutiveErrorCeiling { count: usize, last_error: String },
}

impl From<&FailureReason> for EngineError {
    fn from(reason: &FailureReason) -> Self {
        match reason {
            FailureReason::StepBudgetExceeded { limit } => {
                EngineError::StepBudgetExceeded { limit: *limit }
            }
            FailureReason::ConsecutiveErrorCeiling { count, .. } => {
                EngineError::ConsecutiveErrorCeiling { count: *count }
            }
        }
    }
}

/// Audit record produced for every terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub task_id: String,
    pub request: String,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub summary: String,
    pub steps: usize,
    pub actions: Vec<ActionRecord>,
    pub evaluations: Vec<Evaluation>,
    pub notes: Vec<String>,

    /// Action dispatched in the cycle that observed cancellation; never undone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted_action: Option<ActionRecord>,

    pub duration_ms: u64,
}

impl RunReport {
    /// The report's failure as a crate error, for hints and exit codes
    pub fn error(&self) -> Option<EngineError> {
        match self.state {
            RunState::Failed => self.reason.as_ref().map(EngineError::from),
            RunState::Cancelled => Some(EngineError::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_are_monotonic() {
        assert!(RunState::Idle.can_transition_to(RunState::Running));
        assert!(RunState::Running.can_transition_to(RunState::Finished));
        assert!(RunState::Running.can_transition_to(RunState::Cancelled));
        assert!(!RunState::Running.can_transition_to(RunState::Idle));
        for terminal in [RunState::Finished, RunState::Failed, RunState::Cancelled] {
            for next in [
                RunState::Idle,
                RunState::Running,
                RunState::Finished,
                RunState::Failed,
                RunState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_action_record_captures_target() {
        let record = ActionRecord::new(Action::OpenApp {
            package: "com.android.settings".into(),
        });
        assert_eq!(record.target.as_deref(), Some("com.android.settings"));

        let record = ActionRecord::new(Action::Tap { x: 1, y: 2 });
        assert!(record.target.is_none());
    }

    #[test]
    fn test_failure_reason_maps_to_engine_error() {
        let reason = FailureReason::StepBudgetExceeded { limit: 5 };
        assert!(matches!(
            EngineError::from(&reason),
            EngineError::StepBudgetExceeded { limit: 5 }
        ));
    }

    #[test]
    fn test_verdict_serializes_lowercase() {
        let json = serde_json::to_string(&Evaluation::new(Verdict::Anomaly, "popup")).unwrap();
        assert_eq!(json, r#"{"verdict":"anomaly","rationale":"popup"}"#);
    }
}
