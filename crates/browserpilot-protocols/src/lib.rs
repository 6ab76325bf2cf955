//! Protocol definitions shared between the BrowserPilot engine and the
//! pluggable agent runner implementations.
//!
//! The engine never talks to a browser itself; it hands natural-language
//! instructions to an [`AgentRunner`] and reacts to the verdict.

pub mod abort;
pub mod mock;
pub mod runner;

pub use abort::AbortSignal;
pub use mock::MockAgentRunner;
pub use runner::{AgentOutcome, AgentRunner, ProgressFn, RunnerError};
