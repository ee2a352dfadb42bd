//! Tapwise SDK
//!
//! Shared library providing the contract between the Tapwise engine and the
//! device backends that actually perform taps, swipes and app launches.
//! A backend implements [`ActionDispatcher`]; the engine never talks to a
//! device any other way.

/// Error types and handling
pub mod errors;

/// Action vocabulary, observations and the dispatcher trait
pub mod action;

// Re-export commonly used types
pub use action::{Action, ActionDispatcher, ActionError, KeyCode, Observation, MAX_WAIT_MS};
pub use errors::{EngineError, ErrorExt};
