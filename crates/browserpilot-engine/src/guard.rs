//! In-flight run guard.
//!
//! A shared set of currently running workflow ids. The scheduler consults it
//! before invoking the run callback so a scheduled run cannot overlap a
//! manual run of the same workflow inside one process.

use std::sync::Arc;

use dashmap::DashSet;

/// Set of workflow ids currently executing. Cheap to clone; clones share the
/// same underlying set.
#[derive(Clone, Default)]
pub struct RunGuard {
    in_flight: Arc<DashSet<String>>,
}

impl RunGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to mark a workflow as running. Returns a permit that releases the
    /// id on drop, or `None` if the workflow is already in flight.
    pub fn try_acquire(&self, id: &str) -> Option<RunPermit> {
        if self.in_flight.insert(id.to_string()) {
            Some(RunPermit {
                in_flight: self.in_flight.clone(),
                id: id.to_string(),
            })
        } else {
            None
        }
    }

    /// Check whether a workflow is currently running.
    pub fn is_running(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }
}

/// Permit held for the duration of one workflow run.
pub struct RunPermit {
    in_flight: Arc<DashSet<String>>,
    id: String,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}
