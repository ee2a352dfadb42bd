//! Agent
//!
//! Top-level task handling: route a task to a delegation fast path or to the
//! multi-role agent loop.

pub mod core;

pub use self::core::{AgentCore, Outcome};
