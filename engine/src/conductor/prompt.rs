//! Prompt assembly
//!
//! Renders each role's system and user prompt from a `Workspace` snapshot.
//! Every system prompt opens with the role's name; the scripted provider
//! routes on it.

use super::types::{ActionRecord, Evaluation};
use super::workspace::Workspace;
use crate::llm::{truncate, Prompt};
use sdk::{Action, Observation};
use std::fmt::Write as _;

/// Number of past actions shown to the roles
pub const HISTORY_WINDOW: usize = 5;

pub const PLANNER_SYSTEM: &str = "You are the Planner of an agent that operates an Android phone.\n\
Break the user's task into short, ordered sub-goals and track progress through them.\n\n\
If the task is fully complete, answer with the single word: Finished\n\n\
Otherwise answer in exactly this format:\n\
Plan:\n\
1. <first sub-goal>\n\
2. <second sub-goal>\n\
Current subgoal: <number of the sub-goal to work on now>";

pub const ACTOR_SYSTEM: &str = "You are the Actor of an agent that operates an Android phone.\n\
Given the current screen and sub-goal, choose exactly ONE next action.\n\n\
Respond with a single JSON object and nothing else. Valid actions:\n\
{\"action\":\"tap\",\"x\":540,\"y\":1200}\n\
{\"action\":\"long_press\",\"x\":540,\"y\":1200}\n\
{\"action\":\"swipe\",\"x1\":540,\"y1\":1600,\"x2\":540,\"y2\":400,\"duration_ms\":400}\n\
{\"action\":\"type\",\"text\":\"hello\"}\n\
{\"action\":\"press_key\",\"key\":\"back\"}   (keys: back, home, enter, app_switch)\n\
{\"action\":\"open_app\",\"package\":\"com.android.settings\"}\n\
{\"action\":\"deep_link\",\"uri\":\"geo:0,0?q=coffee\",\"package\":\"com.google.android.apps.maps\"}\n\
{\"action\":\"wait\",\"ms\":1000}\n\n\
Coordinates are screen pixels. Never leave a parameter out.";

pub const EVALUATOR_SYSTEM: &str = "You are the Evaluator of an agent that operates an Android phone.\n\
Compare the screen before and after the action and judge its outcome.\n\n\
Respond with a single JSON object and nothing else:\n\
{\"verdict\":\"success\"|\"failure\"|\"anomaly\",\"rationale\":\"<one sentence>\"}\n\n\
success: the action did what the sub-goal needed.\n\
failure: the action had no effect or the wrong effect.\n\
anomaly: an unexpected state appeared (popup, crash, a different app).";

pub const RECORDER_SYSTEM: &str = "You are the Recorder of an agent that operates an Android phone.\n\
Extract facts from the latest step that will matter later in the task, such as\n\
confirmation numbers, prices, names or addresses shown on screen.\n\n\
Respond with a single JSON object and nothing else:\n\
{\"notes\":[\"<fact>\", ...]}\n\
Use an empty list when there is nothing worth keeping.";

fn render_task(ws: &Workspace, out: &mut String) {
    let task = ws.task();
    let _ = writeln!(out, "Task: {}", task.request);
    if !task.preferred_apps.is_empty() {
        let _ = writeln!(out, "Preferred apps: {}", task.preferred_apps.join(", "));
    }
    if !task.guide_steps.is_empty() {
        let _ = writeln!(out, "Known steps for this kind of task:");
        for (i, step) in task.guide_steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step);
        }
    }
}

fn render_plan(ws: &Workspace, out: &mut String) {
    if ws.plan().is_empty() {
        let _ = writeln!(out, "Plan: (none yet)");
        return;
    }
    let _ = writeln!(out, "Plan:");
    for (i, goal) in ws.plan().iter().enumerate() {
        let marker = if i == ws.current_subgoal() { ">" } else { " " };
        let _ = writeln!(out, "{} {}. {}", marker, i + 1, goal);
    }
}

fn render_history(ws: &Workspace, out: &mut String) {
    let recent: Vec<(&ActionRecord, &Evaluation)> = ws.recent_history(HISTORY_WINDOW).collect();
    if recent.is_empty() {
        return;
    }
    let _ = writeln!(out, "Recent actions:");
    for (record, evaluation) in recent {
        let _ = writeln!(
            out,
            "- {} -> {}: {}",
            record.action,
            evaluation.verdict,
            truncate(&evaluation.rationale, 160)
        );
    }
}

fn render_notes(ws: &Workspace, out: &mut String) {
    if ws.notes().is_empty() {
        return;
    }
    let _ = writeln!(out, "Notes:");
    for note in ws.notes() {
        let _ = writeln!(out, "- {}", note);
    }
}

fn render_observation(label: &str, observation: Option<&Observation>, out: &mut String) {
    let Some(obs) = observation else {
        let _ = writeln!(out, "{}: no capture available", label);
        return;
    };
    let _ = write!(out, "{}:", label);
    if let Some(app) = &obs.foreground_app {
        let _ = write!(out, " foreground app {}", app);
    }
    if let Some(description) = &obs.description {
        let _ = write!(out, " {}", description);
    }
    if obs.screenshot.is_some() {
        let _ = write!(out, " (screenshot attached)");
    }
    out.push('\n');
}

pub fn planner_prompt(ws: &Workspace) -> Prompt {
    let mut user = String::new();
    render_task(ws, &mut user);
    render_plan(ws, &mut user);
    let _ = writeln!(user, "Completed steps: {}", ws.step_index());
    render_history(ws, &mut user);
    render_notes(ws, &mut user);

    if ws.needs_replan() {
        let _ = writeln!(
            user,
            "The last action led to an unexpected state. Revise the plan to recover."
        );
    } else if let Some(error) = ws.last_error() {
        let _ = writeln!(user, "Last error: {}", truncate(error, 200));
    }

    Prompt::new(PLANNER_SYSTEM, user)
}

pub fn actor_prompt(ws: &Workspace) -> Prompt {
    let mut user = String::new();
    render_task(ws, &mut user);
    if let Some(goal) = ws.current_subgoal_text() {
        let _ = writeln!(user, "Current sub-goal: {}", goal);
    }
    if let Some(hint) = &ws.task().skill_hint {
        let _ = writeln!(user, "Constraint: {}", hint);
    }
    render_history(ws, &mut user);
    render_notes(ws, &mut user);
    if let Some(error) = ws.last_error() {
        let _ = writeln!(user, "Last error: {}", truncate(error, 200));
    }
    render_observation("Current screen", ws.last_observation(), &mut user);

    let mut prompt = Prompt::new(ACTOR_SYSTEM, user);
    if let Some(path) = ws.last_observation().and_then(|o| o.screenshot.clone()) {
        prompt = prompt.with_image(path);
    }
    prompt
}

pub fn evaluator_prompt(
    ws: &Workspace,
    action: &Action,
    before: Option<&Observation>,
    after: &Observation,
) -> Prompt {
    let mut user = String::new();
    render_task(ws, &mut user);
    if let Some(goal) = ws.current_subgoal_text() {
        let _ = writeln!(user, "Current sub-goal: {}", goal);
    }
    let _ = writeln!(user, "Action taken: {}", action);
    render_observation("Before", before, &mut user);
    render_observation("After", Some(after), &mut user);

    let mut prompt = Prompt::new(EVALUATOR_SYSTEM, user);
    for path in [before.and_then(|o| o.screenshot.clone()), after.screenshot.clone()]
        .into_iter()
        .flatten()
    {
        prompt = prompt.with_image(path);
    }
    prompt
}

pub fn recorder_prompt(ws: &Workspace) -> Prompt {
    let mut user = String::new();
    render_task(ws, &mut user);
    if let Some((record, evaluation)) = ws.recent_history(1).next() {
        let _ = writeln!(
            user,
            "Latest step: {} -> {}: {}",
            record.action, evaluation.verdict, evaluation.rationale
        );
    }
    render_notes(ws, &mut user);
    render_observation("Current screen", ws.last_observation(), &mut user);

    let mut prompt = Prompt::new(RECORDER_SYSTEM, user);
    if let Some(path) = ws.last_observation().and_then(|o| o.screenshot.clone()) {
        prompt = prompt.with_image(path);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::Task;

    #[test]
    fn test_actor_prompt_includes_skill_hint_and_screenshot() {
        let task = Task::new("post a status").with_skill_hint("Keep the text under 280 characters");
        let mut ws = Workspace::new(task);
        ws.apply_plan(vec!["Open the app".into()], Some(0));
        ws.set_observation(Observation::new("o1").with_screenshot("/tmp/s.png"));

        let prompt = actor_prompt(&ws);
        assert!(prompt.system.starts_with("You are the Actor"));
        assert!(prompt.user.contains("Constraint: Keep the text under 280 characters"));
        assert!(prompt.user.contains("Current sub-goal: Open the app"));
        assert_eq!(prompt.images.len(), 1);
    }

    #[test]
    fn test_planner_prompt_flags_replan() {
        let mut ws = Workspace::new(Task::new("t"));
        ws.record_step(
            ActionRecord::new(Action::Tap { x: 1, y: 1 }),
            Evaluation::new(crate::conductor::Verdict::Anomaly, "permission dialog"),
        );
        let prompt = planner_prompt(&ws);
        assert!(prompt.user.contains("unexpected state"));
        assert!(prompt.user.contains("permission dialog"));
    }

    #[test]
    fn test_history_window_is_bounded() {
        let mut ws = Workspace::new(Task::new("t"));
        for i in 0..(HISTORY_WINDOW + 3) {
            ws.record_step(
                ActionRecord::new(Action::Wait { ms: i as u64 }),
                Evaluation::success(format!("r{}", i)),
            );
        }
        let prompt = planner_prompt(&ws);
        assert_eq!(prompt.user.matches("-> success").count(), HISTORY_WINDOW);
    }

    #[test]
    fn test_evaluator_prompt_attaches_both_screens() {
        let ws = Workspace::new(Task::new("t"));
        let before = Observation::new("a").with_screenshot("/tmp/a.png");
        let after = Observation::new("b").with_screenshot("/tmp/b.png");
        let prompt = evaluator_prompt(&ws, &Action::Tap { x: 1, y: 2 }, Some(&before), &after);
        assert_eq!(prompt.images.len(), 2);
        assert!(prompt.system.starts_with("You are the Evaluator"));
    }
}
