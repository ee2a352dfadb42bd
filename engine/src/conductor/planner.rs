//! Conductor Planner
//!
//! Asks the model for an ordered sub-goal list and the index of the sub-goal
//! to work on, or for the finish signal when the task is complete.

use crate::conductor::completion::{detect_finish, FinishMatch};
use crate::conductor::prompt::planner_prompt;
use crate::conductor::workspace::Workspace;
use crate::llm::{truncate, LLMError, ModelGateway};
use regex::Regex;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    Finished(FinishMatch),
    Continue {
        plan: Vec<String>,
        /// 0-based index of the reported current sub-goal
        current_subgoal: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlannerError {
    #[error("Planner model call failed: {0}")]
    Model(#[from] LLMError),

    #[error("Planner returned no plan: {0}")]
    EmptyPlan(String),
}

pub struct Planner {
    gateway: Arc<ModelGateway>,
}

static STEP_LINE: OnceLock<Regex> = OnceLock::new();
static SUBGOAL_LINE: OnceLock<Regex> = OnceLock::new();

fn step_line() -> &'static Regex {
    STEP_LINE.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+[.)]|[-*])\s+(.+?)\s*$").expect("Invalid plan step pattern")
    })
}

fn subgoal_line() -> &'static Regex {
    SUBGOAL_LINE.get_or_init(|| {
        Regex::new(r"(?i)current\s+sub-?goal\s*[:#]?\s*(\d+)").expect("Invalid sub-goal pattern")
    })
}

/// Parse raw Planner output
pub fn parse_plan(content: &str) -> Result<PlannerOutput, PlannerError> {
    if let Some(matched) = detect_finish(content) {
        return Ok(PlannerOutput::Finished(matched));
    }

    let mut plan = Vec::new();
    let mut current_subgoal = None;

    for line in content.lines() {
        if let Some(caps) = subgoal_line().captures(line) {
            current_subgoal = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .map(|n| n.saturating_sub(1));
            continue;
        }
        if let Some(caps) = step_line().captures(line) {
            if let Some(step) = caps.get(1) {
                plan.push(step.as_str().to_string());
            }
        }
    }

    if plan.is_empty() {
        return Err(PlannerError::EmptyPlan(truncate(content.trim(), 120)));
    }

    Ok(PlannerOutput::Continue {
        plan,
        current_subgoal,
    })
}

impl Planner {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn plan(&self, ws: &Workspace) -> Result<PlannerOutput, PlannerError> {
        let prompt = planner_prompt(ws);
        let content = self.gateway.predict(&prompt).await?;
        tracing::debug!("Planner output: {}", truncate(&content, 200));
        parse_plan(&content)
    }
}
