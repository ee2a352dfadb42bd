//! Shared Workspace (InfoPool)
//!
//! The single mutable record of one run. Every role reads it; only the
//! orchestrator writes to it, and only through the methods below, which keep
//! these invariants:
//!
//! - the action and evaluation histories grow together, one pair per dispatched action
//! - the step index only moves forward, by one per successful cycle
//! - the run state never leaves a terminal state
//! - notes are append-only

use super::types::{ActionRecord, Evaluation, RunReport, RunState, Task, Verdict};
use super::FailureReason;
use sdk::Observation;

#[derive(Debug, Clone)]
pub struct Workspace {
    task: Task,
    plan: Vec<String>,
    /// Index into `plan` of the sub-goal being worked on
    current_subgoal: usize,
    step_index: usize,
    actions: Vec<ActionRecord>,
    evaluations: Vec<Evaluation>,
    notes: Vec<String>,
    last_observation: Option<Observation>,
    state: RunState,
    error_count: usize,
    last_error: Option<String>,
    needs_replan: bool,
}

impl Workspace {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            plan: Vec::new(),
            current_subgoal: 0,
            step_index: 0,
            actions: Vec::new(),
            evaluations: Vec::new(),
            notes: Vec::new(),
            last_observation: None,
            state: RunState::Idle,
            error_count: 0,
            last_error: None,
            needs_replan: false,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn current_subgoal(&self) -> usize {
        self.current_subgoal
    }

    /// Text of the current sub-goal, if a plan exists
    pub fn current_subgoal_text(&self) -> Option<&str> {
        self.plan.get(self.current_subgoal).map(String::as_str)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.last()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.last_observation.as_ref()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True after an Anomaly verdict until the next Success
    pub fn needs_replan(&self) -> bool {
        self.needs_replan
    }

    /// The last `n` actions paired with their verdicts, oldest first
    pub fn recent_history(&self, n: usize) -> impl Iterator<Item = (&ActionRecord, &Evaluation)> {
        let skip = self.actions.len().saturating_sub(n);
        self.actions
            .iter()
            .zip(self.evaluations.iter())
            .skip(skip)
    }

    /// Move to `next` if the transition is legal. Returns whether it happened.
    pub fn transition(&mut self, next: RunState) -> bool {
        if self.state.can_transition_to(next) {
            tracing::debug!("Run state {} -> {}", self.state, next);
            self.state = next;
            true
        } else {
            tracing::warn!("Ignoring illegal run state transition {} -> {}", self.state, next);
            false
        }
    }

    /// Install the Planner's latest plan.
    ///
    /// The sub-goal pointer follows the Planner's report on the first cycle,
    /// after a successful step, after an Anomaly asked for a re-plan, and
    /// whenever the plan text changed (an old index means nothing against a
    /// new list). Only a plain Failure against an unchanged plan keeps the
    /// current sub-goal.
    pub fn apply_plan(&mut self, plan: Vec<String>, reported_subgoal: Option<usize>) {
        let last_succeeded = self
            .last_evaluation()
            .map(Evaluation::is_success)
            .unwrap_or(true);
        let may_move = last_succeeded || self.needs_replan || plan != self.plan;

        self.plan = plan;

        if may_move {
            if let Some(index) = reported_subgoal {
                self.current_subgoal = index;
            }
        }

        if !self.plan.is_empty() && self.current_subgoal >= self.plan.len() {
            self.current_subgoal = self.plan.len() - 1;
        }
    }

    pub fn set_observation(&mut self, observation: Observation) {
        self.last_observation = Some(observation);
    }

    /// Append a dispatched action together with its verdict and update the
    /// step index and error counter accordingly
    pub fn record_step(&mut self, action: ActionRecord, evaluation: Evaluation) {
        match evaluation.verdict {
            Verdict::Success => {
                self.step_index += 1;
                self.error_count = 0;
                self.last_error = None;
                self.needs_replan = false;
            }
            Verdict::Failure => {
                self.error_count += 1;
                self.last_error = Some(evaluation.rationale.clone());
            }
            Verdict::Anomaly => {
                self.error_count += 1;
                self.last_error = Some(evaluation.rationale.clone());
                self.needs_replan = true;
            }
        }
        self.actions.push(action);
        self.evaluations.push(evaluation);
    }

    /// Count a failed cycle that produced no dispatched action
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error_count += 1;
        self.last_error = Some(error.into());
    }

    /// Append durable notes, skipping blanks and exact duplicates
    pub fn append_notes(&mut self, notes: impl IntoIterator<Item = String>) -> usize {
        let mut added = 0;
        for note in notes {
            let note = note.trim().to_string();
            if note.is_empty() || self.notes.contains(&note) {
                continue;
            }
            self.notes.push(note);
            added += 1;
        }
        added
    }

    /// Snapshot the workspace into a report
    pub fn report(
        &self,
        reason: Option<FailureReason>,
        summary: impl Into<String>,
        interrupted_action: Option<ActionRecord>,
        duration_ms: u64,
    ) -> RunReport {
        RunReport {
            task_id: self.task.id.clone(),
            request: self.task.request.clone(),
            state: self.state,
            reason,
            summary: summary.into(),
            steps: self.step_index,
            actions: self.actions.clone(),
            evaluations: self.evaluations.clone(),
            notes: self.notes.clone(),
            interrupted_action,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::Action;

    fn tap() -> ActionRecord {
        ActionRecord::new(Action::Tap { x: 10, y: 20 })
    }

    fn plan(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("goal {}", i)).collect()
    }

    #[test]
    fn test_new_workspace_is_idle() {
        let ws = Workspace::new(Task::new("open settings"));
        assert_eq!(ws.state(), RunState::Idle);
        assert_eq!(ws.step_index(), 0);
        assert!(ws.actions().is_empty());
        assert!(ws.notes().is_empty());
    }

    #[test]
    fn test_success_advances_and_resets() {
        let mut ws = Workspace::new(Task::new("t"));
        ws.record_error("unparseable");
        ws.record_step(tap(), Evaluation::failure("missed"));
        assert_eq!(ws.error_count(), 2);
        assert_eq!(ws.step_index(), 0);

        ws.record_step(tap(), Evaluation::success("ok"));
        assert_eq!(ws.error_count(), 0);
        assert_eq!(ws.step_index(), 1);
        assert_eq!(ws.actions().len(), ws.evaluations().len());
        assert!(ws.last_error().is_none());
    }

    #[test]
    fn test_anomaly_requests_replan() {
        let mut ws = Workspace::new(Task::new("t"));
        ws.record_step(tap(), Evaluation::new(Verdict::Anomaly, "popup"));
        assert!(ws.needs_replan());
        assert_eq!(ws.last_error(), Some("popup"));

        ws.record_step(tap(), Evaluation::success("dismissed"));
        assert!(!ws.needs_replan());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut ws = Workspace::new(Task::new("t"));
        assert!(ws.transition(RunState::Running));
        assert!(ws.transition(RunState::Finished));
        assert!(!ws.transition(RunState::Running));
        assert!(!ws.transition(RunState::Failed));
        assert_eq!(ws.state(), RunState::Finished);
    }

    #[test]
    fn test_subgoal_pointer_holds_after_failure() {
        let mut ws = Workspace::new(Task::new("t"));
        ws.apply_plan(plan(3), Some(0));
        assert_eq!(ws.current_subgoal(), 0);

        ws.record_step(tap(), Evaluation::success("ok"));
        ws.apply_plan(plan(3), Some(1));
        assert_eq!(ws.current_subgoal(), 1);

        ws.record_step(tap(), Evaluation::failure("missed the button"));
        ws.apply_plan(plan(3), Some(2));
        assert_eq!(ws.current_subgoal(), 1);
        assert_eq!(ws.current_subgoal_text(), Some("goal 2"));
    }

    #[test]
    fn test_replan_after_anomaly_moves_to_recovery_subgoal() {
        let original = vec!["Open app".to_string(), "Search burger".to_string()];
        let mut ws = Workspace::new(Task::new("order a burger"));
        ws.apply_plan(original.clone(), Some(0));
        ws.record_step(tap(), Evaluation::success("app opened"));
        ws.apply_plan(original, Some(1));
        assert_eq!(ws.current_subgoal_text(), Some("Search burger"));

        ws.record_step(tap(), Evaluation::new(Verdict::Anomaly, "permission popup"));
        ws.apply_plan(
            vec![
                "Dismiss permission popup".to_string(),
                "Open app".to_string(),
                "Search burger".to_string(),
            ],
            Some(0),
        );
        assert_eq!(ws.current_subgoal_text(), Some("Dismiss permission popup"));
    }

    #[test]
    fn test_rewritten_plan_after_failure_follows_report() {
        let mut ws = Workspace::new(Task::new("t"));
        ws.apply_plan(plan(3), Some(0));
        ws.record_step(tap(), Evaluation::success("ok"));
        ws.apply_plan(plan(3), Some(2));

        ws.record_step(tap(), Evaluation::failure("wrong screen"));
        ws.apply_plan(vec!["Go back".to_string(), "goal 3".to_string()], Some(0));
        assert_eq!(ws.current_subgoal_text(), Some("Go back"));
    }

    #[test]
    fn test_subgoal_pointer_clamped_to_plan() {
        let mut ws = Workspace::new(Task::new("t"));
        ws.apply_plan(plan(2), Some(7));
        assert_eq!(ws.current_subgoal(), 1);
    }

    #[test]
    fn test_notes_are_deduplicated() {
        let mut ws = Workspace::new(Task::new("t"));
        let added = ws.append_notes(vec![
            "Order #123".to_string(),
            "  ".to_string(),
            "Order #123".to_string(),
        ]);
        assert_eq!(added, 1);
        assert_eq!(ws.notes(), &["Order #123".to_string()]);
    }

    #[test]
    fn test_recent_history_keeps_tail() {
        let mut ws = Workspace::new(Task::new("t"));
        for i in 0..7 {
            ws.record_step(tap(), Evaluation::success(format!("step {}", i)));
        }
        let recent: Vec<_> = ws.recent_history(5).collect();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].1.rationale, "step 2");
        assert_eq!(recent[4].1.rationale, "step 6");
    }
}
