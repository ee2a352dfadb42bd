//! Error types and handling
//!
//! This module provides the error types used throughout the Tapwise engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never include API keys or raw request bodies that could
//! carry them. Hints are static strings safe to show to end users.

use thiserror::Error;

/// Trait for Tapwise error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Catalog**: Skill catalog parsing failures
/// - **Model**: Gateway failures after retries are exhausted
/// - **Execution**: Device action failures
/// - **Budget**: Step or consecutive-error ceilings exceeded
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::StepBudgetExceeded { limit: 30 };
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("bad threshold".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Skill catalog errors
    #[error("Skill catalog error: {0}")]
    Catalog(String),

    // Model gateway errors
    #[error("Model provider error: {0}")]
    ModelProvider(String),

    #[error("Model call timed out")]
    ModelTimeout,

    // Device action errors
    #[error("Action failed: {0}")]
    Action(#[from] crate::action::ActionError),

    // Agent loop errors
    #[error("Step budget of {limit} exceeded")]
    StepBudgetExceeded { limit: usize },

    #[error("{count} consecutive step failures")]
    ConsecutiveErrorCeiling { count: usize },

    #[error("Task cancelled")]
    Cancelled,
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Catalog(_) => "Check the skill catalog file for errors",

            Self::ModelProvider(_) => "Model provider unavailable. Check your API key and network",
            Self::ModelTimeout => "Model provider took too long to respond. Try again",

            Self::Action(_) => "The device rejected the action. Check the device connection",

            Self::StepBudgetExceeded { .. } => {
                "Task needed too many steps. Try breaking it into smaller tasks"
            }
            Self::ConsecutiveErrorCeiling { .. } => {
                "The agent kept failing on the same step. Check the device screen"
            }
            Self::Cancelled => "Task was stopped before it finished",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Catalog(_))
    }
}
