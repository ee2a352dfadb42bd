//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Execute a task on the device (or record it with --dry-run)
//! - skills list: List the skill catalog
//! - skills match: Show how a request would be routed
//! - doctor: Check providers, the catalog and the device connection

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use sdk::{ActionDispatcher, ErrorExt};

use crate::agent::{AgentCore, Outcome};
use crate::config::Config;
use crate::conductor::{RunLimits, RunReport, RunState, Task};
use crate::device::{Adb, AdbAppScanner, AdbDispatcher, RecordingDispatcher};
use crate::llm::ModelGateway;
use crate::skills::{
    AppScanner, ExecutionPlan, ExecutionType, InstalledApps, IntentMatcher, SkillCatalog,
};

/// How often the installed-app list is rescanned during a run
const APP_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load_catalog(config: &Config) -> Result<Arc<SkillCatalog>> {
    let catalog = SkillCatalog::load(&config.skills.catalog_path)
        .await
        .with_context(|| {
            format!(
                "Failed to load skill catalog from {}",
                config.skills.catalog_path.display()
            )
        })?;
    Ok(Arc::new(catalog))
}

/// Every package the catalog mentions; a dry run pretends they are installed
fn catalog_packages(catalog: &SkillCatalog) -> Vec<String> {
    let mut packages: Vec<String> = catalog
        .skills()
        .iter()
        .flat_map(|skill| skill.apps.iter().map(|app| app.package.clone()))
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

/// Run a task
///
/// The installed-app list is scanned once before matching and then kept
/// fresh by a background task for the rest of the run. Ctrl-C raises
/// `cancel`; the loop stops at its next check.
pub async fn handle_run(
    task: String,
    dry_run: bool,
    config: &Config,
    format: OutputFormat,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let gateway = Arc::new(ModelGateway::from_config(&config.llm));
    let catalog = load_catalog(config).await?;

    let dispatcher: Arc<dyn ActionDispatcher>;
    let scanner: Arc<dyn AppScanner>;
    if dry_run {
        let recorder =
            Arc::new(RecordingDispatcher::new().with_installed(catalog_packages(&catalog)));
        dispatcher = recorder.clone();
        scanner = recorder;
    } else {
        dispatcher = Arc::new(AdbDispatcher::new(
            &config.device,
            config.agent.screenshot_dir.clone(),
        ));
        scanner = Arc::new(AdbAppScanner::new(&config.device));
    }

    let apps = Arc::new(InstalledApps::new());
    if let Err(e) = apps.refresh(scanner.as_ref()).await {
        tracing::warn!("Initial installed-app scan failed: {}", e);
    }
    let refresher = apps
        .clone()
        .spawn_refresh(scanner, Some(APP_REFRESH_INTERVAL));

    let matcher = IntentMatcher::from_config(&config.skills, catalog, apps, Some(gateway.clone()));
    let core = AgentCore::new(
        gateway,
        dispatcher,
        matcher,
        RunLimits::from(&config.agent),
    );

    let agent_task = Task::new(task.clone());

    match format {
        OutputFormat::Text => {
            println!("Executing task: {}", task);
            if dry_run {
                println!("(dry run: actions are recorded, not sent to a device)");
            }
            println!();
        }
        OutputFormat::Json => {
            print_json(&json!({
                "status": "running",
                "task_id": agent_task.id,
                "task": task,
                "dry_run": dry_run,
            }))?;
        }
    }

    let outcome = core.process_task(agent_task, cancel).await;
    refresher.abort();

    if let OutputFormat::Json = format {
        print_json(&outcome)?;
    }

    match outcome {
        Outcome::Delegated { app, uri, .. } => {
            if let OutputFormat::Text = format {
                println!("✓ Handed to {}", app.label());
                println!("  Deep link: {}", uri);
            }
            Ok(())
        }
        Outcome::Completed(report) => {
            if let OutputFormat::Text = format {
                print_report(&report);
            }
            match report.error() {
                Some(e) => Err(anyhow::Error::new(e)),
                None => Ok(()),
            }
        }
    }
}

fn print_report(report: &RunReport) {
    let mark = match report.state {
        RunState::Finished => "✓",
        _ => "✗",
    };
    println!("{} {}", mark, report.summary);
    println!("  Task ID: {}", report.task_id);
    println!("  Steps: {}", report.steps);
    println!("  Duration: {}ms", report.duration_ms);

    if !report.actions.is_empty() {
        println!();
        println!("Actions:");
        for (i, (record, evaluation)) in report
            .actions
            .iter()
            .zip(report.evaluations.iter())
            .enumerate()
        {
            println!(
                "  {:>2}. {} [{}] {}",
                i + 1,
                record.action,
                evaluation.verdict,
                evaluation.rationale
            );
        }
    }

    if let Some(record) = &report.interrupted_action {
        println!();
        println!("Interrupted during: {}", record.action);
    }

    if !report.notes.is_empty() {
        println!();
        println!("Notes:");
        for note in &report.notes {
            println!("  - {}", note);
        }
    }

    if let Some(e) = report.error() {
        println!();
        println!("Hint: {}", e.user_hint());
    }
}

/// List the skill catalog
pub async fn handle_skills_list(config: &Config, format: OutputFormat) -> Result<()> {
    let catalog = load_catalog(config).await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "catalog": config.skills.catalog_path,
            "skills": catalog.skills(),
        })),
        OutputFormat::Text => {
            if catalog.is_empty() {
                println!(
                    "No skills found in {}",
                    config.skills.catalog_path.display()
                );
                return Ok(());
            }
            println!("Skills ({}):", catalog.len());
            for skill in catalog.skills() {
                println!();
                println!("  {} - {}", skill.id, skill.name);
                if !skill.description.is_empty() {
                    println!("    {}", skill.description);
                }
                if !skill.keywords.is_empty() {
                    println!("    Keywords: {}", skill.keywords.join(", "));
                }
                for app in &skill.apps {
                    let kind = match (app.execution_type, &app.deep_link) {
                        (ExecutionType::Delegation, Some(link)) => {
                            format!("delegation via {}", link)
                        }
                        (ExecutionType::Delegation, None) => "delegation".to_string(),
                        (ExecutionType::GuiAutomation, _) => "gui automation".to_string(),
                    };
                    println!("    [{:>3}] {} - {}", app.priority, app.label(), kind);
                }
            }
            Ok(())
        }
    }
}

/// Show how a request would be routed, without running it
pub async fn handle_skills_match(
    query: String,
    installed: Vec<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let catalog = load_catalog(config).await?;

    let apps = if installed.is_empty() {
        let apps = Arc::new(InstalledApps::new());
        if let Err(e) = apps.refresh(&AdbAppScanner::new(&config.device)).await {
            tracing::warn!(
                "Could not list installed apps ({}); pass --installed to match offline",
                e
            );
        }
        apps
    } else {
        Arc::new(InstalledApps::with_packages(installed))
    };

    let gateway = Arc::new(ModelGateway::from_config(&config.llm));
    let matcher = IntentMatcher::from_config(&config.skills, catalog, apps, Some(gateway));
    let plan = matcher.plan(&query).await;

    match format {
        OutputFormat::Json => print_json(&plan),
        OutputFormat::Text => {
            println!("Query: {}", query);
            println!("Strategies: {}", matcher.strategy_names().join(" → "));
            println!();
            match plan {
                ExecutionPlan::FastPath { matched, uri } => {
                    println!("Fast path: {} ({})", matched.skill.id, matched.strategy);
                    println!("  App: {}", matched.app.label());
                    println!("  Confidence: {:.2}", matched.confidence);
                    println!("  Deep link: {}", uri);
                }
                ExecutionPlan::AgentLoop {
                    matched: Some(matched),
                } => {
                    println!("Agent loop guided by {} ({})", matched.skill.id, matched.strategy);
                    println!("  App: {}", matched.app.label());
                    println!("  Confidence: {:.2}", matched.confidence);
                }
                ExecutionPlan::AgentLoop { matched: None } => {
                    println!("Agent loop (no skill matched)");
                }
            }
            Ok(())
        }
    }
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".into(), "Valid".into()));

    match SkillCatalog::load(&config.skills.catalog_path).await {
        Ok(catalog) if catalog.is_empty() => {
            checks.push(("Skill catalog".into(), "Empty".into()));
            issues.push(format!(
                "No skills in {}; every task will use the agent loop",
                config.skills.catalog_path.display()
            ));
        }
        Ok(catalog) => checks.push(("Skill catalog".into(), format!("{} skill(s)", catalog.len()))),
        Err(e) => {
            checks.push(("Skill catalog".into(), "Invalid".into()));
            issues.push(format!("Skill catalog: {}", e));
        }
    }

    let gateway = ModelGateway::from_config(&config.llm);
    let health = gateway.check_health().await;
    if health.is_empty() {
        issues.push("No model providers configured".to_string());
    }
    for (name, healthy) in &health {
        let status = if *healthy { "Available" } else { "Not available" };
        checks.push((format!("Provider {}", name), status.into()));
    }
    if !health.is_empty() && !health.iter().any(|(_, healthy)| *healthy) {
        issues.push("No model provider is reachable".to_string());
    }

    match Adb::from_config(&config.device).version().await {
        Ok(version) => checks.push(("ADB".into(), version)),
        Err(e) => {
            checks.push(("ADB".into(), "Not available".into()));
            issues.push(format!("ADB: {}", e));
        }
    }

    if config.agent.screenshot_dir.exists() {
        checks.push(("Screenshot directory".into(), "Exists".into()));
    } else {
        checks.push(("Screenshot directory".into(), "Will be created".into()));
    }

    match format {
        OutputFormat::Json => print_json(&json!({
            "healthy": issues.is_empty(),
            "checks": checks
                .iter()
                .map(|(name, status)| json!({ "name": name, "status": status }))
                .collect::<Vec<_>>(),
            "issues": issues,
        }))?,
        OutputFormat::Text => {
            println!("Tapwise diagnostics");
            println!();
            for (name, status) in &checks {
                println!("  {:<24} {}", name, status);
            }
            if issues.is_empty() {
                println!();
                println!("✓ All checks passed");
            } else {
                println!();
                println!("Issues:");
                for issue in &issues {
                    println!("  - {}", issue);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_packages_are_unique() {
        let catalog = SkillCatalog::from_toml_str(
            r#"
            [[skills]]
            id = "food"
            name = "Food"
            [[skills.apps]]
            package = "com.food"
            name = "Food"
            execution_type = "gui_automation"

            [[skills]]
            id = "groceries"
            name = "Groceries"
            [[skills.apps]]
            package = "com.food"
            name = "Food"
            execution_type = "gui_automation"
            [[skills.apps]]
            package = "com.market"
            name = "Market"
            execution_type = "gui_automation"
            "#,
        )
        .unwrap();

        assert_eq!(catalog_packages(&catalog), vec!["com.food", "com.market"]);
    }
}
