//! Conductor Evaluator
//!
//! Judges a dispatched action by comparing the screen before and after it.
//! The verdict drives the loop: `Success` advances, `Failure` retries the
//! sub-goal and `Anomaly` sends the Planner back to re-plan.

use crate::conductor::prompt::evaluator_prompt;
use crate::conductor::types::{Evaluation, Verdict};
use crate::conductor::workspace::Workspace;
use crate::llm::{extract_json_payload, truncate, LLMError, ModelGateway};
use sdk::{Action, Observation};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Evaluator model call failed: {0}")]
    Model(#[from] LLMError),

    #[error("Unparseable verdict: {0}")]
    Unparseable(String),
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    verdict: String,
    #[serde(default)]
    rationale: String,
}

pub struct Evaluator {
    gateway: Arc<ModelGateway>,
}

/// Map raw model output onto an `Evaluation`
pub fn parse_evaluation(content: &str) -> Result<Evaluation, EvaluatorError> {
    let payload =
        extract_json_payload(content).map_err(|e| EvaluatorError::Unparseable(e.to_string()))?;

    let raw: RawEvaluation = serde_json::from_str(payload)
        .map_err(|e| EvaluatorError::Unparseable(format!("{} in {}", e, truncate(payload, 120))))?;

    let verdict = match raw.verdict.trim().to_lowercase().as_str() {
        "success" => Verdict::Success,
        "failure" | "fail" | "failed" => Verdict::Failure,
        "anomaly" => Verdict::Anomaly,
        other => {
            return Err(EvaluatorError::Unparseable(format!(
                "unknown verdict '{}'",
                other
            )))
        }
    };

    let rationale = if raw.rationale.trim().is_empty() {
        format!("{} (no rationale given)", verdict)
    } else {
        raw.rationale.trim().to_string()
    };

    Ok(Evaluation::new(verdict, rationale))
}

impl Evaluator {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn evaluate(
        &self,
        ws: &Workspace,
        action: &Action,
        before: Option<&Observation>,
        after: &Observation,
    ) -> Result<Evaluation, EvaluatorError> {
        let prompt = evaluator_prompt(ws, action, before, after);
        let content = self.gateway.predict(&prompt).await?;
        let evaluation = parse_evaluation(&content)?;
        tracing::info!(
            "Evaluated {}: {} ({})",
            action,
            evaluation.verdict,
            truncate(&evaluation.rationale, 120)
        );
        Ok(evaluation)
    }
}
