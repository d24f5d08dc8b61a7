//! HIVEMIND Orchestrator - Collaboration Workflows
//!
//! Runs named collaboration patterns as conversations. A configured chat
//! backend negotiates the collaboration; without one, or when it fails, a
//! deterministic executor walks the workflow steps in order and dispatches
//! each (role, task) pair to a task executor.

mod conversation;
mod executors;
mod orchestrator;
mod patterns;

pub use conversation::*;
pub use executors::*;
pub use orchestrator::*;
pub use patterns::*;
