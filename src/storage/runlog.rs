//! Run log
//!
//! One JSON file per round under the run log directory. Entries are written
//! once and never modified. The log is diagnostic: failing to write one is
//! reported as a warning and the run carries on.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{PilotError, Result, WorkflowExecutionResult};
use crate::digest::DomDigest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    id: String,
    timestamp: DateTime<Utc>,
    url: String,
    #[serde(default)]
    dom_digest: Option<DomDigest>,
    execution_result: WorkflowExecutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    round: Option<usize>,
}

impl RunLogEntry {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dom_digest(&self) -> Option<&DomDigest> {
        self.dom_digest.as_ref()
    }

    pub fn execution_result(&self) -> &WorkflowExecutionResult {
        &self.execution_result
    }

    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    pub fn round(&self) -> Option<usize> {
        self.round
    }
}

/// Where and why a run happened
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub url: String,
    pub digest: Option<DomDigest>,
    pub intent: Option<String>,
    pub round: Option<usize>,
}

impl RunContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_digest(mut self, digest: Option<DomDigest>) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>, round: usize) -> Self {
        self.intent = Some(intent.into());
        self.round = Some(round);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure the backing directory exists
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PilotError::persistence(format!(
                "Failed to create run log dir {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Record a run. The entry is returned even when it could not be written.
    pub async fn create_run_log(
        &self,
        result: &WorkflowExecutionResult,
        context: RunContext,
    ) -> RunLogEntry {
        let entry = RunLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            url: context.url,
            dom_digest: context.digest,
            execution_result: result.clone(),
            intent: context.intent,
            round: context.round,
        };

        match self.write(&entry).await {
            Ok(path) => debug!(id = %entry.id, path = %path.display(), "run logged"),
            Err(e) => warn!(id = %entry.id, "run log write failed: {}", e),
        }

        entry
    }

    async fn write(&self, entry: &RunLogEntry) -> Result<PathBuf> {
        let path = self.entry_path(&entry.id);
        let json = serde_json::to_string_pretty(entry)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    pub async fn load(&self, id: &str) -> Result<RunLogEntry> {
        let path = self.entry_path(id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PilotError::persistence(format!("Run '{}' not found: {}", id, e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All readable entries, newest first
    pub async fn list(&self) -> Result<Vec<RunLogEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(PilotError::from)
                .and_then(|content| Ok(serde_json::from_str::<RunLogEntry>(&content)?));
            match parsed {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), "skipping unreadable run log: {}", e),
            }
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}
