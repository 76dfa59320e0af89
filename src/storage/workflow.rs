//! Saved workflows
//!
//! Accepted documents are kept by name so they can be run again without the
//! feedback loop.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::core::{PilotError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedWorkflow {
    pub id: String,
    pub name: String,
    pub intent: String,
    /// Step document text
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save(
        &self,
        name: &str,
        intent: &str,
        document: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<SavedWorkflow>;

    /// Look up by id, or by name (newest save wins)
    async fn load(&self, name_or_id: &str) -> Result<SavedWorkflow>;

    /// All workflows, newest first
    async fn list(&self) -> Result<Vec<SavedWorkflow>>;
}

/// One JSON file per saved workflow
pub struct FileWorkflowStore {
    dir: PathBuf,
}

impl FileWorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn save(
        &self,
        name: &str,
        intent: &str,
        document: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<SavedWorkflow> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PilotError::persistence("Workflow name must not be empty"));
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PilotError::persistence(format!(
                "Failed to create workflow dir {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let workflow = SavedWorkflow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            intent: intent.to_string(),
            document: document.to_string(),
            description: description.map(str::to_string),
            tags: tags.to_vec(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&workflow)?;
        tokio::fs::write(self.path_for(&workflow.id), json)
            .await
            .map_err(|e| PilotError::persistence(format!("Failed to save workflow: {}", e)))?;

        Ok(workflow)
    }

    async fn load(&self, name_or_id: &str) -> Result<SavedWorkflow> {
        if let Ok(content) = tokio::fs::read_to_string(self.path_for(name_or_id)).await {
            return Ok(serde_json::from_str(&content)?);
        }

        self.list()
            .await?
            .into_iter()
            .find(|w| w.name == name_or_id)
            .ok_or_else(|| PilotError::persistence(format!("Workflow '{}' not found", name_or_id)))
    }

    async fn list(&self) -> Result<Vec<SavedWorkflow>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut workflows = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<SavedWorkflow>(&content) {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => warn!(path = %path.display(), "skipping unreadable workflow: {}", e),
            }
        }

        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }
}
