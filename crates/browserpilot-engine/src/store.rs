//! Workflow persistence store.
//!
//! One addressable JSON record per workflow. The trait carries the CRUD
//! surface plus the record-level operations (create, duplicate,
//! export/import) implemented over it.

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::definition::{now_millis, Workflow};
use crate::error::EngineError;

/// Trait for workflow persistence.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Save a workflow (upsert). Always stamps `updated_at` before writing.
    async fn save(&self, workflow: &mut Workflow) -> Result<(), EngineError>;

    /// Load a workflow by ID.
    async fn load(&self, id: &str) -> Result<Option<Workflow>, EngineError>;

    /// Load all workflows, sorted by `updated_at` descending.
    async fn load_all(&self) -> Result<Vec<Workflow>, EngineError>;

    /// Delete a workflow by ID. Returns whether a record existed.
    async fn delete(&self, id: &str) -> Result<bool, EngineError>;

    /// Create and persist a new workflow with empty steps.
    async fn create(&self, name: &str, description: &str) -> Result<Workflow, EngineError> {
        let mut workflow = Workflow::new(name, description);
        self.save(&mut workflow).await?;
        Ok(workflow)
    }

    /// Deep-copy a workflow under a new id with fresh timestamps and a
    /// decorated name.
    async fn duplicate(&self, workflow: &Workflow) -> Result<Workflow, EngineError> {
        let mut copy = workflow.clone();
        copy.id = Uuid::new_v4().to_string();
        copy.name = format!("{} (Copy)", workflow.name);
        copy.created_at = now_millis();
        self.save(&mut copy).await?;
        Ok(copy)
    }

    /// Serialize a workflow as pretty JSON.
    fn export(&self, workflow: &Workflow) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(workflow)?)
    }

    /// Parse and persist an exported workflow.
    ///
    /// Rejects records without a usable `name` or `steps`. Always assigns a
    /// fresh id and fresh timestamps; import never preserves the original
    /// identity.
    async fn import(&self, text: &str) -> Result<Workflow, EngineError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EngineError::InvalidImport(format!("not valid JSON: {}", e)))?;

        match value.get("name").and_then(|n| n.as_str()) {
            Some(name) if !name.is_empty() => {}
            _ => {
                return Err(EngineError::InvalidImport(
                    "missing or empty 'name'".to_string(),
                ))
            }
        }
        if !value.get("steps").is_some_and(|s| s.is_array()) {
            return Err(EngineError::InvalidImport(
                "missing or malformed 'steps'".to_string(),
            ));
        }

        let mut workflow: Workflow = serde_json::from_value(value)
            .map_err(|e| EngineError::InvalidImport(e.to_string()))?;
        workflow.id = Uuid::new_v4().to_string();
        workflow.created_at = now_millis();
        self.save(&mut workflow).await?;
        Ok(workflow)
    }
}

/// In-memory workflow store for tests and embedding.
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl MemoryWorkflowStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn save(&self, workflow: &mut Workflow) -> Result<(), EngineError> {
        workflow.updated_at = now_millis();
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Workflow>, EngineError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(id).cloned())
    }

    async fn load_all(&self) -> Result<Vec<Workflow>, EngineError> {
        let workflows = self.workflows.read().await;
        let mut all: Vec<Workflow> = workflows.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<bool, EngineError> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.remove(id).is_some())
    }
}

/// File system based workflow store: one `<id>.json` file per workflow.
///
/// Writes to the same id are serialized through a per-id async mutex so a
/// scheduler bookkeeping write cannot race a manual save of the same record.
pub struct FileWorkflowStore {
    dir: PathBuf,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileWorkflowStore {
    /// Create a new file-based store rooted at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!("FileWorkflowStore initialized at {:?}", dir);
        Ok(Self {
            dir,
            write_locks: DashMap::new(),
        })
    }

    fn workflow_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::sanitize_id(id)))
    }

    fn sanitize_id(id: &str) -> String {
        id.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn save(&self, workflow: &mut Workflow) -> Result<(), EngineError> {
        workflow.updated_at = now_millis();
        let content = serde_json::to_string_pretty(workflow)?;
        let path = self.workflow_path(&workflow.id);
        let tmp = path.with_extension("json.tmp");

        let lock = self.lock_for(&workflow.id);
        let _guard = lock.lock().await;
        // Write-then-rename so a concurrent reader never sees a torn record.
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!("Saved workflow '{}' to {:?}", workflow.id, path);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Workflow>, EngineError> {
        let path = self.workflow_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn load_all(&self) -> Result<Vec<Workflow>, EngineError> {
        let mut workflows = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            // A corrupt record is skipped, never aborting the whole load.
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<Workflow>(&content) {
                    Ok(workflow) => workflows.push(workflow),
                    Err(e) => {
                        warn!("Skipping corrupt workflow record {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read workflow file {:?}: {}", path, e);
                }
            }
        }

        workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        debug!("Loaded {} workflows from {:?}", workflows.len(), self.dir);
        Ok(workflows)
    }

    async fn delete(&self, id: &str) -> Result<bool, EngineError> {
        let path = self.workflow_path(id);
        let lock = self.lock_for(id);
        let guard = lock.lock().await;

        let existed = path.exists();
        if existed {
            fs::remove_file(&path).await?;
            debug!("Deleted workflow '{}' from {:?}", id, path);
        }

        drop(guard);
        self.write_locks.remove(id);
        Ok(existed)
    }
}
