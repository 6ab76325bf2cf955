//! BrowserPilot workflow engine.
//!
//! The engine decides what to run, when, in what order, and how to react to
//! success and failure. It has three parts:
//!
//! - [`store`] — CRUD persistence for workflow definitions, one addressable
//!   JSON record per workflow.
//! - [`executor`] — drives a single workflow to completion (mission mode or
//!   step-graph mode), producing a structured result and an ordered log.
//! - [`scheduler`] — a recurring 60-second tick that loads all workflows,
//!   runs the due ones through a host callback, and updates each workflow's
//!   recurrence bookkeeping.

pub mod definition;
pub mod error;
pub mod executor;
pub mod guard;
pub mod scheduler;
pub mod store;

pub use definition::{Recurrence, Schedule, StepBranch, Workflow, WorkflowStep};
pub use error::EngineError;
pub use executor::{ExecutionResult, LogKind, RunLogEntry, WorkflowExecutor};
pub use guard::{RunGuard, RunPermit};
pub use scheduler::{
    calculate_next_run, calculate_next_run_at, next_run_time, SchedulerHooks, WorkflowScheduler,
};
pub use store::{FileWorkflowStore, MemoryWorkflowStore, WorkflowStore};
