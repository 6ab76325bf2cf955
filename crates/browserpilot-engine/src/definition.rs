//! Workflow definitions.
//!
//! Records serialize with camelCase field names; the persisted JSON is the
//! canonical wire shape for export/import.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse a `"HH:MM"` time-of-day string.
pub fn parse_hhmm(time: &str) -> Option<(u32, u32)> {
    let (hh, mm) = time.split_once(':')?;
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    if hour < 24 && minute < 60 {
        Some((hour, minute))
    } else {
        None
    }
}

/// Branch target of a step, chosen after the step settles.
///
/// Serialized as the bare strings `"next"`, `"end"`, `"retry"`, or a step id.
/// `Retry` is a selectable sentinel that resolves exactly like `End`: per-step
/// retries are already exhausted by `retry_count` before branch resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepBranch {
    /// The step immediately following the current one, if any.
    Next,
    /// No next step.
    End,
    /// Sentinel equivalent to `End` at resolution time.
    Retry,
    /// The step with the given id; an unknown id resolves to no next step.
    Goto(String),
}

impl Default for StepBranch {
    fn default() -> Self {
        StepBranch::Next
    }
}

impl From<String> for StepBranch {
    fn from(value: String) -> Self {
        match value.as_str() {
            "next" | "" => StepBranch::Next,
            "end" => StepBranch::End,
            "retry" => StepBranch::Retry,
            _ => StepBranch::Goto(value),
        }
    }
}

impl From<StepBranch> for String {
    fn from(branch: StepBranch) -> Self {
        match branch {
            StepBranch::Next => "next".to_string(),
            StepBranch::End => "end".to_string(),
            StepBranch::Retry => "retry".to_string(),
            StepBranch::Goto(id) => id,
        }
    }
}

/// A single step in a step-mode workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Step ID, unique within its workflow.
    #[serde(default)]
    pub id: String,
    /// Display label.
    #[serde(default)]
    pub name: String,
    /// Natural-language instruction for this step.
    #[serde(default)]
    pub prompt: String,
    /// Agent iteration bound for this step.
    #[serde(default = "default_step_max_turns")]
    pub max_turns: u32,
    /// Branch taken when the step succeeds.
    #[serde(default)]
    pub on_success: StepBranch,
    /// Branch taken when the step fails.
    #[serde(default)]
    pub on_failure: StepBranch,
    /// Same-step re-attempts before the step counts as failed.
    #[serde(default)]
    pub retry_count: u32,
}

fn default_step_max_turns() -> u32 {
    20
}

impl WorkflowStep {
    /// Create a new step.
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt: prompt.into(),
            max_turns: default_step_max_turns(),
            on_success: StepBranch::Next,
            on_failure: StepBranch::Next,
            retry_count: 0,
        }
    }

    /// Set the success branch.
    pub fn with_on_success(mut self, branch: StepBranch) -> Self {
        self.on_success = branch;
        self
    }

    /// Set the failure branch.
    pub fn with_on_failure(mut self, branch: StepBranch) -> Self {
        self.on_failure = branch;
        self
    }

    /// Set the retry count.
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set the agent iteration bound.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }
}

/// Recurrence rule of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Recurrence {
    /// Every `interval_minutes`, anchored to the last run.
    Interval { interval_minutes: i64 },
    /// Every day at `time` ("HH:MM", local).
    Daily { time: String },
    /// Every week on `day_of_week` (0-6, Sunday = 0) at `time`.
    Weekly { time: String, day_of_week: u8 },
}

/// Recurrence descriptor embedded in a workflow.
///
/// `last_run` and `next_run` are scheduler bookkeeping; the scheduler is their
/// only writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub enabled: bool,
    #[serde(flatten)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub last_run: Option<i64>,
    #[serde(default)]
    pub next_run: Option<i64>,
}

impl Schedule {
    /// Create an enabled schedule with no bookkeeping yet.
    pub fn new(recurrence: Recurrence) -> Self {
        Self {
            enabled: true,
            recurrence,
            last_run: None,
            next_run: None,
        }
    }
}

/// A named automation unit.
///
/// A workflow runs in exactly one mode: mission mode when `mission` is
/// non-empty (`steps` is ignored), step mode otherwise. Neither present is a
/// validation failure at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Opaque unique identifier, immutable after creation.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Disabled workflows are never auto-run by the scheduler.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Free-text instruction; non-empty selects mission mode.
    #[serde(default)]
    pub mission: Option<String>,
    /// Agent iteration bound for mission mode.
    #[serde(default = "default_mission_max_turns")]
    pub max_turns: u32,
    /// Step graph; used only when `mission` is empty or absent.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Optional recurrence descriptor.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    /// Creation time, epoch milliseconds.
    #[serde(default)]
    pub created_at: i64,
    /// Rewritten by the store on every save.
    #[serde(default)]
    pub updated_at: i64,
}

fn default_true() -> bool {
    true
}

fn default_mission_max_turns() -> u32 {
    30
}

impl Workflow {
    /// Create a new workflow with a fresh id and empty steps.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            enabled: true,
            mission: None,
            max_turns: default_mission_max_turns(),
            steps: Vec::new(),
            schedule: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the mission text.
    pub fn with_mission(mut self, mission: impl Into<String>) -> Self {
        self.mission = Some(mission.into());
        self
    }

    /// Set the step graph.
    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Set the schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Whether the workflow runs in mission mode.
    pub fn is_mission_mode(&self) -> bool {
        self.mission.as_deref().is_some_and(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_new() {
        let wf = Workflow::new("Daily digest", "Collect the morning news");
        assert!(!wf.id.is_empty());
        assert!(wf.enabled);
        assert!(wf.steps.is_empty());
        assert_eq!(wf.max_turns, 30);
        assert_eq!(wf.created_at, wf.updated_at);
    }

    #[test]
    fn test_mission_mode_detection() {
        let wf = Workflow::new("a", "");
        assert!(!wf.is_mission_mode());
        let wf = wf.with_mission("");
        assert!(!wf.is_mission_mode());
        let wf = wf.with_mission("check the inbox");
        assert!(wf.is_mission_mode());
    }

    #[test]
    fn test_step_defaults() {
        let step = WorkflowStep::new("s1", "Login", "Log into the site");
        assert_eq!(step.max_turns, 20);
        assert_eq!(step.retry_count, 0);
        assert_eq!(step.on_success, StepBranch::Next);
        assert_eq!(step.on_failure, StepBranch::Next);
    }

    #[test]
    fn test_step_branch_parsing() {
        assert_eq!(StepBranch::from("next".to_string()), StepBranch::Next);
        assert_eq!(StepBranch::from("end".to_string()), StepBranch::End);
        assert_eq!(StepBranch::from("retry".to_string()), StepBranch::Retry);
        assert_eq!(
            StepBranch::from("step-7".to_string()),
            StepBranch::Goto("step-7".to_string())
        );
        assert_eq!(StepBranch::from(String::new()), StepBranch::Next);
    }

    #[test]
    fn test_step_branch_serde_as_string() {
        let step = WorkflowStep::new("s1", "n", "p")
            .with_on_success(StepBranch::Goto("s2".to_string()))
            .with_on_failure(StepBranch::End);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["onSuccess"], "s2");
        assert_eq!(json["onFailure"], "end");

        let back: WorkflowStep = serde_json::from_value(json).unwrap();
        assert_eq!(back.on_success, StepBranch::Goto("s2".to_string()));
        assert_eq!(back.on_failure, StepBranch::End);
    }

    #[test]
    fn test_workflow_serde_camel_case() {
        let wf = Workflow::new("n", "d").with_schedule(Schedule::new(Recurrence::Interval {
            interval_minutes: 15,
        }));
        let json = serde_json::to_value(&wf).unwrap();
        assert!(json.get("maxTurns").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["schedule"]["type"], "interval");
        assert_eq!(json["schedule"]["intervalMinutes"], 15);
    }

    #[test]
    fn test_schedule_serde_weekly() {
        let schedule = Schedule::new(Recurrence::Weekly {
            time: "09:00".to_string(),
            day_of_week: 1,
        });
        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json["type"], "weekly");
        assert_eq!(json["time"], "09:00");
        assert_eq!(json["dayOfWeek"], 1);

        let back: Schedule = serde_json::from_value(json).unwrap();
        assert_eq!(back, schedule);
    }

    #[test]
    fn test_workflow_deserialize_minimal() {
        let json = serde_json::json!({
            "name": "imported",
            "steps": []
        });
        let wf: Workflow = serde_json::from_value(json).unwrap();
        assert_eq!(wf.name, "imported");
        assert!(wf.enabled);
        assert_eq!(wf.max_turns, 30);
        assert!(wf.schedule.is_none());
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:00"), Some((9, 0)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
        assert_eq!(parse_hhmm(""), None);
    }
}
