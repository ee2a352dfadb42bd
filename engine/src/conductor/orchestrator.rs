//! Orchestrator
//!
//! The control loop of one task run. Each cycle while `Running`:
//!
//! 1. Check cancellation, then ask the Planner; a finish signal ends the run
//! 2. Fail with `StepBudgetExceeded` once the step index reaches the budget
//! 3. Ask the Actor for one action
//! 4. Dispatch it and capture the new observation; check cancellation again
//! 5. Ask the Evaluator for a verdict and append action + verdict to history
//! 6. On `Success`, run the Recorder and start the next step
//!
//! Every failed cycle (role error, dispatch error, `Failure` or `Anomaly`)
//! increments the consecutive-error counter, and the run fails once it reaches
//! the ceiling. A success resets it.
//!
//! Cancellation is cooperative and never interrupts an in-flight model call or
//! device action. An action already dispatched when cancellation is observed
//! is reported, not undone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sdk::{ActionDispatcher, Observation};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::AgentConfig;
use crate::conductor::actor::Actor;
use crate::conductor::evaluator::Evaluator;
use crate::conductor::planner::{Planner, PlannerOutput};
use crate::conductor::recorder::Recorder;
use crate::conductor::types::{
    ActionRecord, Evaluation, FailureReason, RunReport, RunState, Task,
};
use crate::conductor::workspace::Workspace;
use crate::llm::ModelGateway;

/// Ceilings applied to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_steps: usize,
    pub max_consecutive_errors: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps: 30,
            max_consecutive_errors: 3,
        }
    }
}

impl From<&AgentConfig> for RunLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_consecutive_errors: config.max_consecutive_errors,
        }
    }
}

/// Result of one cycle
enum Cycle {
    Continue,
    Stop(Ending),
}

struct Ending {
    reason: Option<FailureReason>,
    summary: String,
    interrupted_action: Option<ActionRecord>,
}

impl Ending {
    fn new(summary: impl Into<String>) -> Self {
        Self {
            reason: None,
            summary: summary.into(),
            interrupted_action: None,
        }
    }
}

pub struct Orchestrator {
    planner: Planner,
    actor: Actor,
    evaluator: Evaluator,
    recorder: Recorder,
    dispatcher: Arc<dyn ActionDispatcher>,
    limits: RunLimits,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ModelGateway>,
        dispatcher: Arc<dyn ActionDispatcher>,
        limits: RunLimits,
    ) -> Self {
        Self {
            planner: Planner::new(gateway.clone()),
            actor: Actor::new(gateway.clone()),
            evaluator: Evaluator::new(gateway.clone()),
            recorder: Recorder::new(gateway),
            dispatcher,
            limits,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle the host sets to stop the run
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Create the workspace for a task and move it to `Running`
    pub fn start(&self, task: Task) -> Workspace {
        let mut ws = Workspace::new(task);
        ws.transition(RunState::Running);
        ws
    }

    /// Run a task to a terminal state
    pub async fn run(&self, task: Task) -> RunReport {
        let span = tracing::info_span!("task", id = %task.id);
        let ws = self.start(task);
        self.drive(ws).instrument(span).await
    }

    /// Drive a started workspace until it reaches a terminal state
    pub async fn drive(&self, mut ws: Workspace) -> RunReport {
        let started = Instant::now();
        info!("Starting task: {}", ws.task().request);

        match self.dispatcher.observe().await {
            Ok(observation) => ws.set_observation(observation),
            Err(e) => warn!("Initial observation failed: {}", e),
        }

        let ending = loop {
            if ws.state() != RunState::Running {
                break Ending::new(format!("Run was already {}", ws.state()));
            }
            match self.cycle(&mut ws).await {
                Cycle::Continue => continue,
                Cycle::Stop(ending) => break ending,
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match ws.state() {
            RunState::Finished => info!("Task finished after {} step(s)", ws.step_index()),
            RunState::Cancelled => warn!("Task cancelled after {} step(s)", ws.step_index()),
            state => error!("Task ended {}: {}", state, ending.summary),
        }

        ws.report(
            ending.reason,
            ending.summary,
            ending.interrupted_action,
            duration_ms,
        )
    }

    async fn cycle(&self, ws: &mut Workspace) -> Cycle {
        if self.is_cancelled() {
            ws.transition(RunState::Cancelled);
            return Cycle::Stop(Ending::new(format!(
                "Cancelled after {} step(s)",
                ws.step_index()
            )));
        }

        // Plan
        match self.planner.plan(ws).await {
            Ok(PlannerOutput::Finished(matched)) => {
                debug!("Planner finish signal ({:?})", matched);
                ws.transition(RunState::Finished);
                return Cycle::Stop(Ending::new(format!(
                    "Finished after {} step(s)",
                    ws.step_index()
                )));
            }
            Ok(PlannerOutput::Continue {
                plan,
                current_subgoal,
            }) => {
                ws.apply_plan(plan, current_subgoal);
                debug!(
                    "Plan has {} sub-goal(s), working on #{}",
                    ws.plan().len(),
                    ws.current_subgoal() + 1
                );
            }
            Err(e) => {
                warn!("Planner failed: {}", e);
                ws.record_error(e.to_string());
                return self.check_ceiling(ws);
            }
        }

        if ws.step_index() >= self.limits.max_steps {
            let reason = FailureReason::StepBudgetExceeded {
                limit: self.limits.max_steps,
            };
            return self.fail(ws, reason);
        }

        // Act
        let action = match self.actor.decide(ws).await {
            Ok(action) => action,
            Err(e) => {
                warn!("Actor failed: {}", e);
                ws.record_error(e.to_string());
                return self.check_ceiling(ws);
            }
        };

        // Dispatch
        info!("Step {}: {}", ws.step_index() + 1, action);
        let before = ws.last_observation().cloned();
        let record = ActionRecord::new(action.clone());
        let dispatched = self.dispatcher.execute(&action).await;

        if self.is_cancelled() {
            ws.transition(RunState::Cancelled);
            let mut ending = Ending::new(format!(
                "Cancelled after {} step(s); the last action was dispatched and not undone",
                ws.step_index()
            ));
            ending.interrupted_action = Some(record);
            return Cycle::Stop(ending);
        }

        let after: Observation = match dispatched {
            Ok(observation) => observation,
            Err(e) => {
                warn!("Dispatch of {} failed: {}", action, e);
                ws.record_step(record, Evaluation::failure(format!("dispatch failed: {}", e)));
                return self.check_ceiling(ws);
            }
        };
        ws.set_observation(after.clone());

        // Evaluate
        let evaluation = match self
            .evaluator
            .evaluate(ws, &action, before.as_ref(), &after)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!("Evaluator failed: {}", e);
                Evaluation::failure(format!("evaluation unavailable: {}", e))
            }
        };

        let success = evaluation.is_success();
        ws.record_step(record, evaluation);
        if !success {
            return self.check_ceiling(ws);
        }

        // Record
        match self.recorder.record(ws).await {
            Ok(notes) => {
                ws.append_notes(notes);
            }
            Err(e) => warn!("Recorder failed, continuing without notes: {}", e),
        }

        Cycle::Continue
    }

    fn check_ceiling(&self, ws: &mut Workspace) -> Cycle {
        if ws.error_count() < self.limits.max_consecutive_errors {
            debug!(
                "Step error {}/{}, retrying",
                ws.error_count(),
                self.limits.max_consecutive_errors
            );
            return Cycle::Continue;
        }
        let reason = FailureReason::ConsecutiveErrorCeiling {
            count: ws.error_count(),
            last_error: ws.last_error().unwrap_or("unknown error").to_string(),
        };
        self.fail(ws, reason)
    }

    fn fail(&self, ws: &mut Workspace, reason: FailureReason) -> Cycle {
        ws.transition(RunState::Failed);
        Cycle::Stop(Ending {
            summary: reason.to_string(),
            reason: Some(reason),
            interrupted_action: None,
        })
    }
}
