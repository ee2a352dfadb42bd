//! Tapwise Engine Library
//!
//! Multi-role agent loop for driving a mobile device from natural-language
//! tasks. Used by the `tapwise` binary and the integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Model gateway and providers
pub mod llm;

/// Planner, Actor, Evaluator, Recorder and the orchestrating loop
pub mod conductor;

/// Skill catalog, installed apps and intent matching
pub mod skills;

/// Device backends
pub mod device;

/// Task entry point: fast path or agent loop
pub mod agent;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
