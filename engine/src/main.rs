// Tapwise mobile automation agent
// Main entry point for the tapwise binary

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tapwise_engine::cli::{Cli, Command, SkillsAction};
use tapwise_engine::config::Config;
use tapwise_engine::handlers::{
    handle_doctor, handle_run, handle_skills_list, handle_skills_match, OutputFormat,
};
use tapwise_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!(
        "Tapwise v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run { task, dry_run } => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current step");
                    flag.store(true, Ordering::SeqCst);
                }
            });
            handle_run(task, dry_run, &config, format, cancel).await
        }

        Command::Skills { action } => match action {
            SkillsAction::List => handle_skills_list(&config, format).await,
            SkillsAction::Match { query, installed } => {
                handle_skills_match(query, installed, &config, format).await
            }
        },

        Command::Doctor => handle_doctor(&config, format).await,
    }
}
