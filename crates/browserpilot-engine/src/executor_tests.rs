//! Tests for the workflow executor.

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use browserpilot_protocols::{AgentOutcome, MockAgentRunner, RunnerError};

use crate::definition::{StepBranch, Workflow, WorkflowStep};

/// Runner that fails the first `fail_times` calls, then succeeds.
struct FlakyRunner {
    fail_times: u32,
    count: AtomicU32,
}

impl FlakyRunner {
    fn new(fail_times: u32) -> Self {
        Self {
            fail_times,
            count: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AgentRunner for FlakyRunner {
    async fn run(
        &self,
        _prompt: &str,
        _max_turns: u32,
        _progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            Ok(AgentOutcome::failure("element not found"))
        } else {
            Ok(AgentOutcome::success("done"))
        }
    }
}

/// Runner that always raises.
struct RaisingRunner;

#[async_trait]
impl AgentRunner for RaisingRunner {
    async fn run(
        &self,
        _prompt: &str,
        _max_turns: u32,
        _progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError> {
        Err(RunnerError::Failed("bridge crashed".to_string()))
    }
}

/// Runner that fires a shared abort signal during a chosen call.
struct AbortingRunner {
    signal: std::sync::Mutex<Option<Arc<AbortSignal>>>,
    abort_on_call: u32,
    count: AtomicU32,
}

impl AbortingRunner {
    fn new(abort_on_call: u32) -> Self {
        Self {
            signal: std::sync::Mutex::new(None),
            abort_on_call,
            count: AtomicU32::new(0),
        }
    }

    fn arm(&self, signal: Arc<AbortSignal>) {
        *self.signal.lock().unwrap() = Some(signal);
    }
}

#[async_trait]
impl AgentRunner for AbortingRunner {
    async fn run(
        &self,
        _prompt: &str,
        _max_turns: u32,
        _progress: ProgressFn,
    ) -> Result<AgentOutcome, RunnerError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.abort_on_call {
            if let Some(signal) = self.signal.lock().unwrap().as_ref() {
                signal.abort();
            }
        }
        Ok(AgentOutcome::success("ok"))
    }
}

fn step(id: &str, prompt: &str) -> WorkflowStep {
    WorkflowStep::new(id, format!("Step {}", id), prompt)
}

#[tokio::test]
async fn test_mission_mode_ignores_steps() {
    let runner = Arc::new(MockAgentRunner::new());
    // Steps are malformed on purpose: mission mode must never look at them.
    let workflow = Workflow::new("m", "")
        .with_mission("check the inbox")
        .with_steps(vec![WorkflowStep::new("", "", "")
            .with_on_success(StepBranch::Goto("does-not-exist".to_string()))]);

    let executor = WorkflowExecutor::new(workflow, runner.clone());
    let result = executor.execute().await;

    assert!(result.success);
    assert_eq!(result.steps_executed, 1);
    assert_eq!(runner.calls().await, vec!["check the inbox"]);
}

#[tokio::test]
async fn test_mission_failure_records_result_as_error() {
    let runner = Arc::new(MockAgentRunner::new());
    runner
        .set_outcome("buy milk", AgentOutcome::failure("store is closed"))
        .await;
    let workflow = Workflow::new("m", "").with_mission("buy milk");

    let result = WorkflowExecutor::new(workflow, runner).execute().await;

    assert!(!result.success);
    assert_eq!(result.steps_executed, 1);
    assert_eq!(result.error.as_deref(), Some("store is closed"));
}

#[tokio::test]
async fn test_mission_runner_error_is_failure() {
    let workflow = Workflow::new("m", "").with_mission("anything");
    let result = WorkflowExecutor::new(workflow, Arc::new(RaisingRunner))
        .execute()
        .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("bridge crashed"));
}

#[tokio::test]
async fn test_mission_appends_exactly_one_verdict_entry() {
    let runner = Arc::new(MockAgentRunner::new());
    runner
        .set_progress_lines(vec!["opening tab".to_string()])
        .await;
    let workflow = Workflow::new("m", "").with_mission("go");

    let result = WorkflowExecutor::new(workflow, runner).execute().await;

    let verdicts: Vec<_> = result
        .logs
        .iter()
        .filter(|l| matches!(l.kind, LogKind::Success | LogKind::Error))
        .collect();
    assert_eq!(verdicts.len(), 1);
    assert!(result
        .logs
        .iter()
        .any(|l| l.kind == LogKind::Info && l.message == "opening tab"));
}

#[tokio::test]
async fn test_empty_workflow_is_validation_failure() {
    let workflow = Workflow::new("empty", "");
    let result = WorkflowExecutor::new(workflow, Arc::new(MockAgentRunner::new()))
        .execute()
        .await;

    assert!(!result.success);
    assert_eq!(result.steps_executed, 0);
    assert!(result.error.as_deref().unwrap().contains("nothing to run"));
    // Only the start entry precedes the validation error.
    assert!(result.logs[0].message.contains("started"));
}

#[tokio::test]
async fn test_single_step_success() {
    let workflow = Workflow::new("s", "").with_steps(vec![step("s1", "log in")]);
    let result = WorkflowExecutor::new(workflow, Arc::new(MockAgentRunner::new()))
        .execute()
        .await;

    assert!(result.success);
    assert_eq!(result.steps_executed, 1);
    assert_eq!(result.last_step_id.as_deref(), Some("s1"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_sequential_steps_walk_in_order() {
    let runner = Arc::new(MockAgentRunner::new());
    let workflow = Workflow::new("s", "").with_steps(vec![
        step("s1", "open page"),
        step("s2", "fill form"),
        step("s3", "submit"),
    ]);

    let result = WorkflowExecutor::new(workflow, runner.clone()).execute().await;

    assert!(result.success);
    assert_eq!(result.steps_executed, 3);
    assert_eq!(result.last_step_id.as_deref(), Some("s3"));
    assert_eq!(runner.calls().await, vec!["open page", "fill form", "submit"]);
}

#[tokio::test(start_paused = true)]
async fn test_step_retry_then_success() {
    let runner = Arc::new(FlakyRunner::new(2));
    let workflow = Workflow::new("s", "")
        .with_steps(vec![step("s1", "click").with_retry_count(2)]);

    let result = WorkflowExecutor::new(workflow, runner.clone()).execute().await;

    assert!(result.success);
    // Three attempts, one settled execution.
    assert_eq!(runner.count.load(Ordering::SeqCst), 3);
    assert_eq!(result.steps_executed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_step_retries_exhausted_then_failure_branch() {
    let runner = Arc::new(FlakyRunner::new(10));
    let workflow = Workflow::new("s", "").with_steps(vec![step("s1", "click")
        .with_retry_count(1)
        .with_on_failure(StepBranch::End)]);

    let result = WorkflowExecutor::new(workflow, runner.clone()).execute().await;

    assert!(!result.success);
    assert_eq!(runner.count.load(Ordering::SeqCst), 2);
    assert_eq!(result.steps_executed, 1);
    assert!(result.error.as_deref().unwrap().contains("no continuation"));
}

#[tokio::test]
async fn test_retry_sentinel_behaves_like_end() {
    // Regression: on_failure = Retry must produce the same result as End for
    // an otherwise identical failing step.
    let mut results = Vec::new();
    for branch in [StepBranch::End, StepBranch::Retry] {
        let runner = Arc::new(FlakyRunner::new(10));
        let workflow = Workflow::new("s", "")
            .with_steps(vec![step("s1", "click").with_on_failure(branch)]);
        results.push(WorkflowExecutor::new(workflow, runner).execute().await);
    }

    assert_eq!(results[0].success, results[1].success);
    assert_eq!(results[0].last_step_id, results[1].last_step_id);
    assert_eq!(results[0].steps_executed, results[1].steps_executed);
}

#[tokio::test]
async fn test_next_on_last_step_ends_successfully() {
    let workflow = Workflow::new("s", "")
        .with_steps(vec![step("s1", "go").with_on_success(StepBranch::Next)]);
    let result = WorkflowExecutor::new(workflow, Arc::new(MockAgentRunner::new()))
        .execute()
        .await;

    assert!(result.success);
    assert_eq!(result.last_step_id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_goto_unknown_id_terminates() {
    let workflow = Workflow::new("s", "").with_steps(vec![
        step("s1", "go").with_on_success(StepBranch::Goto("missing".to_string()))
    ]);
    let result = WorkflowExecutor::new(workflow, Arc::new(MockAgentRunner::new()))
        .execute()
        .await;

    // Unknown id resolves to no next step, not an error.
    assert!(result.success);
    assert_eq!(result.steps_executed, 1);
}

#[tokio::test]
async fn test_failure_branch_jumps_by_id() {
    let runner = Arc::new(MockAgentRunner::new());
    runner
        .set_outcome("flaky", AgentOutcome::failure("nope"))
        .await;
    let workflow = Workflow::new("s", "").with_steps(vec![
        step("s1", "flaky").with_on_failure(StepBranch::Goto("s3".to_string())),
        step("s2", "skipped"),
        step("s3", "recover"),
    ]);

    let result = WorkflowExecutor::new(workflow, runner.clone()).execute().await;

    assert!(result.success);
    assert_eq!(result.steps_executed, 2);
    assert_eq!(result.last_step_id.as_deref(), Some("s3"));
    assert_eq!(runner.calls().await, vec!["flaky", "recover"]);
}

#[tokio::test]
async fn test_cycle_hits_execution_limit() {
    let workflow = Workflow::new("s", "").with_steps(vec![
        step("s1", "loop").with_on_success(StepBranch::Goto("s1".to_string()))
    ]);
    let result = WorkflowExecutor::new(workflow, Arc::new(MockAgentRunner::new()))
        .execute()
        .await;

    assert!(!result.success);
    assert_eq!(result.steps_executed, MAX_STEP_EXECUTIONS);
    assert!(result.error.as_deref().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_abort_before_second_step() {
    let runner = Arc::new(AbortingRunner::new(1));
    let workflow = Workflow::new("s", "")
        .with_steps(vec![step("s1", "first"), step("s2", "second")]);
    let executor = WorkflowExecutor::new(workflow, runner.clone());
    runner.arm(executor.abort_handle());

    let result = executor.execute().await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(ABORT_ERROR));
    // Only the first step was attempted; abort wins even though it succeeded.
    assert_eq!(result.steps_executed, 1);
    assert_eq!(runner.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abort_before_any_attempt() {
    let workflow = Workflow::new("s", "").with_steps(vec![step("s1", "go")]);
    let executor = WorkflowExecutor::new(workflow, Arc::new(MockAgentRunner::new()));
    executor.abort_handle().abort();

    let result = executor.execute().await;

    assert!(!result.success);
    assert_eq!(result.steps_executed, 0);
    assert_eq!(result.error.as_deref(), Some(ABORT_ERROR));
}

#[tokio::test]
async fn test_log_reconstructs_path() {
    let runner = Arc::new(MockAgentRunner::new());
    runner
        .set_outcome("flaky", AgentOutcome::failure("nope"))
        .await;
    let workflow = Workflow::new("s", "").with_steps(vec![
        step("s1", "flaky").with_on_failure(StepBranch::Goto("s3".to_string())),
        step("s2", "skipped"),
        step("s3", "recover"),
    ]);

    let result = WorkflowExecutor::new(workflow, runner).execute().await;

    let transitions: Vec<_> = result
        .logs
        .iter()
        .filter(|l| l.kind == LogKind::Condition)
        .map(|l| l.step_id.as_str())
        .collect();
    assert_eq!(transitions, vec!["s1", "s3"]);
}

#[test]
fn test_find_next_step_resolution() {
    let steps = vec![
        step("a", "").with_on_success(StepBranch::Goto("c".to_string())),
        step("b", ""),
        step("c", "").with_on_failure(StepBranch::Retry),
    ];

    // Goto by id.
    assert_eq!(WorkflowExecutor::find_next_step(&steps, 0, true), Some(2));
    // Default Next.
    assert_eq!(WorkflowExecutor::find_next_step(&steps, 1, true), Some(2));
    // Next on the last step.
    assert_eq!(WorkflowExecutor::find_next_step(&steps, 2, true), None);
    // Retry sentinel terminates like End.
    assert_eq!(WorkflowExecutor::find_next_step(&steps, 2, false), None);
}
