//! Workflow executor - drives one workflow to completion.
//!
//! Instantiated per run. Mission mode hands the whole mission to the agent
//! runner in a single call; step mode walks the step graph, resolving
//! success/failure branches by id until a terminal state is reached. Every
//! attempt, retry, and transition emits a log entry; the log alone is enough
//! to reconstruct the path taken through the graph.

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use browserpilot_protocols::{AbortSignal, AgentRunner, ProgressFn};

use crate::definition::{now_millis, StepBranch, Workflow, WorkflowStep};

/// Upper bound on step executions per run; breaks cycles in hand-authored
/// branch graphs without attempting cycle detection.
pub const MAX_STEP_EXECUTIONS: u32 = 50;

/// Fixed back-off between same-step retry attempts.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

const ABORT_ERROR: &str = "Workflow aborted by user";

/// Kind of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
    Condition,
}

/// One entry in the ordered audit trail of a run.
///
/// Run-level entries (workflow started/finished, validation) carry an empty
/// `step_id` and the workflow name as `step_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    pub timestamp: i64,
    pub step_id: String,
    pub step_name: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

/// The executor's single return value per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub workflow_id: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Workflow steps settled, not agent turns. Mission mode reports 1.
    pub steps_executed: u32,
    pub last_step_id: Option<String>,
    pub error: Option<String>,
    pub logs: Vec<RunLogEntry>,
}

/// How a step settled after its retry budget.
enum StepSettled {
    Success,
    Failure,
    Aborted,
}

/// Terminal state of the mode-specific walk, before timing is attached.
struct RunEnd {
    success: bool,
    error: Option<String>,
    steps_executed: u32,
    last_step_id: Option<String>,
}

impl RunEnd {
    fn success(steps_executed: u32, last_step_id: Option<String>) -> Self {
        Self {
            success: true,
            error: None,
            steps_executed,
            last_step_id,
        }
    }

    fn failure(error: impl Into<String>, steps_executed: u32, last_step_id: Option<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            steps_executed,
            last_step_id,
        }
    }
}

/// Workflow executor.
pub struct WorkflowExecutor {
    workflow: Workflow,
    runner: Arc<dyn AgentRunner>,
    abort: Arc<AbortSignal>,
    logs: Arc<Mutex<Vec<RunLogEntry>>>,
}

impl WorkflowExecutor {
    /// Create a new executor for one run of the given workflow.
    pub fn new(workflow: Workflow, runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            workflow,
            runner,
            abort: Arc::new(AbortSignal::new()),
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared abort handle; observed cooperatively at step and attempt
    /// boundaries, never mid-call.
    pub fn abort_handle(&self) -> Arc<AbortSignal> {
        self.abort.clone()
    }

    /// Execute the workflow. Infallible at the signature level: every failure
    /// mode resolves into the returned result.
    pub async fn execute(&self) -> ExecutionResult {
        let start_time = now_millis();
        info!(
            "Starting workflow '{}' ({})",
            self.workflow.name, self.workflow.id
        );
        self.log_run(
            LogKind::Info,
            format!("Workflow '{}' started", self.workflow.name),
        );

        let end = if self.workflow.is_mission_mode() {
            self.run_mission().await
        } else if !self.workflow.steps.is_empty() {
            self.run_steps().await
        } else {
            let message = "Workflow has nothing to run: no mission and no steps";
            warn!("Workflow '{}' is empty", self.workflow.id);
            self.log_run(LogKind::Error, message);
            RunEnd::failure(message, 0, None)
        };

        if end.success {
            info!("Workflow '{}' completed successfully", self.workflow.id);
        } else {
            error!("Workflow '{}' failed: {:?}", self.workflow.id, end.error);
        }

        ExecutionResult {
            success: end.success,
            workflow_id: self.workflow.id.clone(),
            start_time,
            end_time: now_millis(),
            steps_executed: end.steps_executed,
            last_step_id: end.last_step_id,
            error: end.error,
            logs: self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    /// Mission mode: one runner call with the whole mission.
    async fn run_mission(&self) -> RunEnd {
        if self.abort.is_aborted() {
            self.log_run(LogKind::Error, ABORT_ERROR);
            return RunEnd::failure(ABORT_ERROR, 0, None);
        }

        let mission = self.workflow.mission.clone().unwrap_or_default();
        let progress = self.progress_fn("", &self.workflow.name);

        match self
            .runner
            .run(&mission, self.workflow.max_turns, progress)
            .await
        {
            Ok(outcome) if outcome.success => {
                self.log_run(
                    LogKind::Success,
                    format!("Mission completed: {}", outcome.result),
                );
                RunEnd::success(1, None)
            }
            Ok(outcome) => {
                self.log_run(
                    LogKind::Error,
                    format!("Mission failed: {}", outcome.result),
                );
                RunEnd::failure(outcome.result, 1, None)
            }
            Err(e) => {
                self.log_run(LogKind::Error, format!("Mission error: {}", e));
                RunEnd::failure(e.to_string(), 1, None)
            }
        }
    }

    /// Step mode: walk the graph from the first step.
    async fn run_steps(&self) -> RunEnd {
        let steps = &self.workflow.steps;
        let mut steps_executed = 0u32;
        let mut last_step_id: Option<String> = None;
        let mut idx = 0usize;

        loop {
            if steps_executed >= MAX_STEP_EXECUTIONS {
                let message = format!(
                    "Execution limit exceeded ({} steps)",
                    MAX_STEP_EXECUTIONS
                );
                self.log_run(LogKind::Error, &message);
                return RunEnd::failure(message, steps_executed, last_step_id);
            }

            let step = &steps[idx];
            let settled = self.execute_step_with_retry(step).await;

            if matches!(settled, StepSettled::Aborted) {
                self.log_run(LogKind::Error, ABORT_ERROR);
                return RunEnd::failure(ABORT_ERROR, steps_executed, last_step_id);
            }

            steps_executed += 1;
            last_step_id = Some(step.id.clone());
            let succeeded = matches!(settled, StepSettled::Success);

            // Abort short-circuits before branch resolution; it does not
            // count as a failure-branch trigger.
            if self.abort.is_aborted() {
                self.log_run(LogKind::Error, ABORT_ERROR);
                return RunEnd::failure(ABORT_ERROR, steps_executed, last_step_id);
            }

            match Self::find_next_step(steps, idx, succeeded) {
                Some(next) => {
                    self.log(
                        &step.id,
                        &step.name,
                        LogKind::Condition,
                        format!(
                            "Step '{}' {}; continuing with step '{}'",
                            step.name,
                            if succeeded { "succeeded" } else { "failed" },
                            steps[next].name
                        ),
                    );
                    idx = next;
                }
                None if succeeded => {
                    self.log(
                        &step.id,
                        &step.name,
                        LogKind::Condition,
                        format!("Step '{}' succeeded; no next step", step.name),
                    );
                    self.log_run(LogKind::Success, "Workflow completed");
                    return RunEnd::success(steps_executed, last_step_id);
                }
                None => {
                    let message = format!("Step '{}' failed with no continuation", step.name);
                    self.log(
                        &step.id,
                        &step.name,
                        LogKind::Condition,
                        format!("Step '{}' failed; no next step", step.name),
                    );
                    self.log_run(LogKind::Error, &message);
                    return RunEnd::failure(message, steps_executed, last_step_id);
                }
            }
        }
    }

    /// Attempt one step, retrying the same step up to `retry_count` times
    /// with a fixed back-off. The abort flag is checked before every attempt,
    /// including the first.
    async fn execute_step_with_retry(&self, step: &WorkflowStep) -> StepSettled {
        let mut attempt = 0u32;

        loop {
            if self.abort.is_aborted() {
                return StepSettled::Aborted;
            }

            debug!(
                "Executing step '{}' ({}) attempt {}/{}",
                step.name,
                step.id,
                attempt + 1,
                step.retry_count + 1
            );
            self.log(
                &step.id,
                &step.name,
                LogKind::Info,
                format!(
                    "Executing step '{}' (attempt {}/{})",
                    step.name,
                    attempt + 1,
                    step.retry_count + 1
                ),
            );

            let progress = self.progress_fn(&step.id, &step.name);
            let failure = match self.runner.run(&step.prompt, step.max_turns, progress).await {
                Ok(outcome) if outcome.success => {
                    self.log(
                        &step.id,
                        &step.name,
                        LogKind::Success,
                        format!("Step '{}' succeeded: {}", step.name, outcome.result),
                    );
                    return StepSettled::Success;
                }
                Ok(outcome) => outcome.result,
                Err(e) => e.to_string(),
            };

            if attempt < step.retry_count {
                warn!(
                    "Step '{}' failed (attempt {}): {}; retrying",
                    step.id,
                    attempt + 1,
                    failure
                );
                self.log(
                    &step.id,
                    &step.name,
                    LogKind::Error,
                    format!("Step '{}' failed: {}; retrying in 1s", step.name, failure),
                );
                sleep(RETRY_BACKOFF).await;
                attempt += 1;
            } else {
                error!(
                    "Step '{}' failed after {} attempt(s): {}",
                    step.id,
                    attempt + 1,
                    failure
                );
                self.log(
                    &step.id,
                    &step.name,
                    LogKind::Error,
                    format!(
                        "Step '{}' failed after {} attempt(s): {}",
                        step.name,
                        attempt + 1,
                        failure
                    ),
                );
                return StepSettled::Failure;
            }
        }
    }

    /// Resolve the branch taken after a step settles.
    ///
    /// `End` and `Retry` both resolve to no next step; references to unknown
    /// ids also resolve to no next step, never an error.
    fn find_next_step(steps: &[WorkflowStep], idx: usize, succeeded: bool) -> Option<usize> {
        let branch = if succeeded {
            &steps[idx].on_success
        } else {
            &steps[idx].on_failure
        };

        match branch {
            StepBranch::Next => {
                if idx + 1 < steps.len() {
                    Some(idx + 1)
                } else {
                    None
                }
            }
            StepBranch::End | StepBranch::Retry => None,
            StepBranch::Goto(id) => steps.iter().position(|s| s.id == *id),
        }
    }

    /// Progress sink forwarding runner output lines into the log.
    fn progress_fn(&self, step_id: &str, step_name: &str) -> ProgressFn {
        let logs = self.logs.clone();
        let step_id = step_id.to_string();
        let step_name = step_name.to_string();
        Arc::new(move |line: String| {
            let entry = RunLogEntry {
                timestamp: now_millis(),
                step_id: step_id.clone(),
                step_name: step_name.clone(),
                kind: LogKind::Info,
                message: line,
            };
            logs.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
        })
    }

    fn log(&self, step_id: &str, step_name: &str, kind: LogKind, message: impl Into<String>) {
        let entry = RunLogEntry {
            timestamp: now_millis(),
            step_id: step_id.to_string(),
            step_name: step_name.to_string(),
            kind,
            message: message.into(),
        };
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn log_run(&self, kind: LogKind, message: impl Into<String>) {
        let name = self.workflow.name.clone();
        self.log("", &name, kind, message);
    }
}
