//! Agent runner contract.
//!
//! An agent runner executes one natural-language instruction against a live
//! browser and reports success or failure plus a textual result. The engine
//! only depends on this trait; concrete bridges live in extension crates.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Callback invoked with progress lines streamed by the runner while an
/// instruction is in flight.
pub type ProgressFn = Arc<dyn Fn(String) + Send + Sync>;

/// Final verdict of one runner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Whether the instruction was carried out successfully.
    pub success: bool,
    /// Textual result or failure explanation from the agent.
    pub result: String,
}

impl AgentOutcome {
    /// Create a successful outcome.
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
        }
    }

    /// Create a failed outcome.
    pub fn failure(result: impl Into<String>) -> Self {
        Self {
            success: false,
            result: result.into(),
        }
    }
}

/// Errors raised by an agent runner.
///
/// A runner that reaches the agent but gets a negative verdict returns
/// `Ok(AgentOutcome { success: false, .. })`; these variants cover the cases
/// where no verdict could be obtained at all.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn agent process: {0}")]
    Spawn(String),

    #[error("Agent runner IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent run timed out after {0}s")]
    Timeout(u64),

    #[error("Agent produced no parseable verdict: {0}")]
    MalformedVerdict(String),

    #[error("Agent run failed: {0}")]
    Failed(String),
}

/// Core trait for agent runners.
///
/// Implementations must be callable repeatedly; the engine awaits each call
/// to completion but hosts may run several workflows in parallel.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Execute one instruction, streaming progress lines through `progress`
    /// and returning the final verdict.
    async fn run(
        &self,
        prompt: &str,
        max_turns: u32,
        progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError>;
}
