//! CLI interface for Tapwise
//!
//! Command-line interface built with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tapwise mobile automation agent
///
/// Turns a natural-language task into taps, swipes and typing on an Android
/// device, or hands it straight to an app through a deep link.
#[derive(Parser, Debug)]
#[command(name = "tapwise")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a task on the device
    Run {
        /// The task to execute
        task: String,

        /// Record actions instead of sending them to the device
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect the skill catalog
    Skills {
        #[command(subcommand)]
        action: SkillsAction,
    },

    /// Check model providers and the device connection
    Doctor,
}

/// Skill catalog actions
#[derive(Subcommand, Debug)]
pub enum SkillsAction {
    /// List every skill in the catalog
    List,

    /// Show how a query would be routed
    Match {
        /// Natural-language request
        query: String,

        /// Assume these packages are installed instead of scanning the device
        #[arg(long = "installed", value_name = "PACKAGE")]
        installed: Vec<String>,
    },
}
