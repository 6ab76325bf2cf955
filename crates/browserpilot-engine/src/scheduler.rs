//! Recurrence scheduler.
//!
//! On a fixed 60-second tick the scheduler loads all workflows, runs the due
//! ones through the host's callback, and updates each workflow's recurrence
//! bookkeeping. A failing run deliberately leaves `next_run` untouched so the
//! workflow is due again on the following tick (retry-until-success).

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};
use tokio::sync::watch;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::definition::{now_millis, parse_hhmm, Recurrence, Workflow};
use crate::error::EngineError;
use crate::guard::RunGuard;
use crate::store::WorkflowStore;

/// Host callbacks consumed by the scheduler.
#[async_trait]
pub trait SchedulerHooks: Send + Sync {
    /// Run one due workflow to completion. An `Err` keeps the workflow's
    /// `next_run` untouched, making it due again on the next tick.
    async fn run_workflow(&self, workflow: &Workflow) -> anyhow::Result<()>;

    /// Fire-and-forget notification for the host's log sink.
    fn log(&self, message: &str);
}

/// Workflow scheduler. One per process by intent; owned by the host, no
/// module-level state.
pub struct WorkflowScheduler {
    store: Arc<dyn WorkflowStore>,
    guard: RunGuard,
    check_interval: Duration,
    shutdown: std::sync::Mutex<Option<watch::Sender<bool>>>,
}

impl WorkflowScheduler {
    /// Create a new scheduler over the given store.
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            guard: RunGuard::new(),
            check_interval: Duration::from_secs(60),
            shutdown: std::sync::Mutex::new(None),
        }
    }

    /// Set the check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// The in-flight guard, shared with manual run paths.
    pub fn run_guard(&self) -> RunGuard {
        self.guard.clone()
    }

    /// Start the recurring check. Arms missing `next_run` values first, then
    /// ticks every `check_interval`, the first check one full period after
    /// start. Re-entrant: a second start replaces the previous timer.
    pub async fn start(self: Arc<Self>, hooks: Arc<dyn SchedulerHooks>) -> Result<(), EngineError> {
        self.stop();
        self.arm_missing_next_runs().await?;

        let (tx, mut rx) = watch::channel(false);
        let scheduler = self.clone();
        tokio::spawn(async move {
            info!(
                "Workflow scheduler started (check interval: {:?})",
                scheduler.check_interval
            );
            let mut ticker = time::interval(scheduler.check_interval);
            // The immediate first tick; checks begin one period later.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.check_schedules(&hooks).await {
                            error!("Schedule check failed: {}", e);
                        }
                    }
                    _ = rx.changed() => {
                        info!("Workflow scheduler shutting down");
                        break;
                    }
                }
            }
        });

        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok(())
    }

    /// Cancel the tick task. A workflow run already in flight is awaited by
    /// the task before it observes the signal.
    pub fn stop(&self) {
        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(true);
        }
    }

    /// Compute and persist `next_run` for schedule-enabled workflows that do
    /// not have one yet.
    async fn arm_missing_next_runs(&self) -> Result<(), EngineError> {
        let workflows = self.store.load_all().await?;
        for mut workflow in workflows {
            let needs_arming = workflow
                .schedule
                .as_ref()
                .is_some_and(|s| s.enabled && s.next_run.is_none());
            if !needs_arming {
                continue;
            }
            match calculate_next_run(&workflow) {
                Some(next) => {
                    if let Some(schedule) = workflow.schedule.as_mut() {
                        schedule.next_run = Some(next);
                    }
                    debug!("Armed next run for workflow '{}': {}", workflow.id, next);
                    self.store.save(&mut workflow).await?;
                }
                None => {
                    warn!(
                        "Workflow '{}' has an unschedulable recurrence",
                        workflow.id
                    );
                }
            }
        }
        Ok(())
    }

    /// One tick: run every due workflow sequentially in store order and
    /// update its bookkeeping.
    async fn check_schedules(&self, hooks: &Arc<dyn SchedulerHooks>) -> Result<(), EngineError> {
        let workflows = self.store.load_all().await?;
        let now = now_millis();

        for mut workflow in workflows {
            if !workflow.enabled {
                continue;
            }
            let Some(schedule) = workflow.schedule.as_ref() else {
                continue;
            };
            if !schedule.enabled {
                continue;
            }

            let Some(next_run) = schedule.next_run else {
                match calculate_next_run(&workflow) {
                    Some(next) => {
                        if let Some(schedule) = workflow.schedule.as_mut() {
                            schedule.next_run = Some(next);
                        }
                        if let Err(e) = self.store.save(&mut workflow).await {
                            error!("Failed to persist next run for '{}': {}", workflow.id, e);
                        }
                    }
                    None => {
                        warn!(
                            "Workflow '{}' has an unschedulable recurrence",
                            workflow.id
                        );
                    }
                }
                continue;
            };

            if next_run > now {
                continue;
            }

            let Some(_permit) = self.guard.try_acquire(&workflow.id) else {
                hooks.log(&format!(
                    "Workflow '{}' is still running; skipping this tick",
                    workflow.name
                ));
                continue;
            };

            hooks.log(&format!("Running scheduled workflow '{}'", workflow.name));
            info!("Workflow '{}' is due, running", workflow.id);

            match hooks.run_workflow(&workflow).await {
                Ok(()) => {
                    if let Some(schedule) = workflow.schedule.as_mut() {
                        schedule.last_run = Some(now);
                    }
                    let next = calculate_next_run(&workflow);
                    if let Some(schedule) = workflow.schedule.as_mut() {
                        schedule.next_run = next;
                    }
                    if let Err(e) = self.store.save(&mut workflow).await {
                        error!("Failed to persist bookkeeping for '{}': {}", workflow.id, e);
                    }
                }
                Err(e) => {
                    // next_run stays put: the workflow is due again next tick.
                    error!("Scheduled run of '{}' failed: {}", workflow.id, e);
                    hooks.log(&format!(
                        "Scheduled run of '{}' failed: {}",
                        workflow.name, e
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Next run time of a workflow based on the current clock. `None` when
/// scheduling is disabled or the recurrence is unparseable.
pub fn calculate_next_run(workflow: &Workflow) -> Option<i64> {
    calculate_next_run_at(workflow, Local::now())
}

/// Pure next-run computation against an explicit "now".
pub fn calculate_next_run_at(workflow: &Workflow, now: DateTime<Local>) -> Option<i64> {
    let schedule = workflow.schedule.as_ref()?;
    if !schedule.enabled {
        return None;
    }

    match &schedule.recurrence {
        // Anchored to the last run; a never-run workflow yields an instant
        // far in the past, i.e. immediately due. Saturating so an absurd
        // configured interval degrades to "far future" instead of wrapping.
        Recurrence::Interval { interval_minutes } => Some(
            schedule
                .last_run
                .unwrap_or(0)
                .saturating_add(interval_minutes.saturating_mul(60_000)),
        ),
        Recurrence::Daily { time } => {
            let (hour, minute) = parse_hhmm(time)?;
            let today = now.date_naive();
            let candidate = local_instant(today, hour, minute)?;
            if candidate > now {
                Some(candidate.timestamp_millis())
            } else {
                Some(local_instant(today.checked_add_days(Days::new(1))?, hour, minute)?.timestamp_millis())
            }
        }
        Recurrence::Weekly { time, day_of_week } => {
            let (hour, minute) = parse_hhmm(time)?;
            if *day_of_week > 6 {
                return None;
            }
            let today = now.date_naive();
            let current = today.weekday().num_days_from_sunday();
            let ahead = (i64::from(*day_of_week) - i64::from(current)).rem_euclid(7) as u64;
            let candidate = local_instant(today.checked_add_days(Days::new(ahead))?, hour, minute)?;
            if candidate > now {
                Some(candidate.timestamp_millis())
            } else {
                // Target time today already passed: a full week forward.
                Some(
                    local_instant(today.checked_add_days(Days::new(ahead + 7))?, hour, minute)?
                        .timestamp_millis(),
                )
            }
        }
    }
}

/// Display helper: the upcoming run as a local instant, without mutating any
/// state.
pub fn next_run_time(workflow: &Workflow) -> Option<DateTime<Local>> {
    let schedule = workflow.schedule.as_ref()?;
    if !schedule.enabled {
        return None;
    }
    let next = schedule.next_run.or_else(|| calculate_next_run(workflow))?;
    DateTime::from_timestamp_millis(next).map(|dt| dt.with_timezone(&Local))
}

fn local_instant(date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Local>> {
    date.and_hms_opt(hour, minute, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}
