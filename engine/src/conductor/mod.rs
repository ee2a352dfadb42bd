//! Conductor System
//!
//! The multi-role agent loop: a shared `Workspace`, the Planner, Actor,
//! Evaluator and Recorder roles, and the `Orchestrator` that sequences them
//! against a device.

pub mod actor;
pub mod completion;
pub mod evaluator;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod recorder;
pub mod types;
pub mod workspace;

pub use actor::{Actor, ActorError};
pub use completion::{detect_finish, FinishMatch};
pub use evaluator::{Evaluator, EvaluatorError};
pub use orchestrator::{Orchestrator, RunLimits};
pub use planner::{Planner, PlannerError, PlannerOutput};
pub use recorder::Recorder;
pub use types::{
    ActionRecord, Evaluation, FailureReason, RunReport, RunState, Task, Verdict,
};
pub use workspace::Workspace;
