//! Mock agent runner for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::runner::{AgentOutcome, AgentRunner, ProgressFn, RunnerError};

/// Mock agent runner that returns pre-configured outcomes.
///
/// Outcomes are keyed by prompt; unscripted prompts succeed with an echo of
/// the prompt. Invocations are recorded for assertions.
pub struct MockAgentRunner {
    outcomes: RwLock<HashMap<String, AgentOutcome>>,
    calls: RwLock<Vec<String>>,
    call_count: AtomicU32,
    progress_lines: RwLock<Vec<String>>,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self {
            outcomes: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            call_count: AtomicU32::new(0),
            progress_lines: RwLock::new(Vec::new()),
        }
    }

    /// Script the outcome for a given prompt.
    pub async fn set_outcome(&self, prompt: &str, outcome: AgentOutcome) {
        self.outcomes
            .write()
            .await
            .insert(prompt.to_string(), outcome);
    }

    /// Script progress lines emitted on every call before the verdict.
    pub async fn set_progress_lines(&self, lines: Vec<String>) {
        *self.progress_lines.write().await = lines;
    }

    /// Prompts the runner was invoked with, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    /// Total number of invocations.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockAgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    async fn run(
        &self,
        prompt: &str,
        _max_turns: u32,
        progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.write().await.push(prompt.to_string());

        for line in self.progress_lines.read().await.iter() {
            progress(line.clone());
        }

        let outcomes = self.outcomes.read().await;
        if let Some(outcome) = outcomes.get(prompt) {
            Ok(outcome.clone())
        } else {
            Ok(AgentOutcome::success(format!("completed: {}", prompt)))
        }
    }
}
