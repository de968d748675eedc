// src/services/metrics_store.rs
use crate::errors::PipelineError;
use crate::models::{MetricsSnapshot, is_safe_path_component};
use log::{error, info};
use std::path::{Path, PathBuf};
use tokio::fs;

const METRICS_SUFFIX: &str = "_metrics.json";

/// One pretty-printed JSON file per finished campaign.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    metrics_dir: PathBuf,
}

impl MetricsStore {
    pub fn new(metrics_dir: impl Into<PathBuf>) -> Self {
        Self {
            metrics_dir: metrics_dir.into(),
        }
    }

    pub async fn ensure_directory(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.metrics_dir).await?;
        info!("Metrics directory ready: {}", self.metrics_dir.display());
        Ok(())
    }

    fn path_for(&self, campaign_id: &str) -> PathBuf {
        self.metrics_dir
            .join(format!("{}{}", campaign_id, METRICS_SUFFIX))
    }

    pub async fn save(&self, snapshot: &MetricsSnapshot) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.metrics_dir).await?;
        let path = self.path_for(&snapshot.campaign_id);
        let body = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&path, body).await?;
        info!("Campaign metrics saved: {}", path.display());
        Ok(path)
    }

    pub async fn get(&self, campaign_id: &str) -> Result<MetricsSnapshot, PipelineError> {
        if !is_safe_path_component(campaign_id) {
            return Err(PipelineError::Validation("Invalid campaign id".to_string()));
        }

        let path = self.path_for(campaign_id);
        if !fs::try_exists(&path).await? {
            return Err(PipelineError::NotFound(format!(
                "No metrics for campaign {}",
                campaign_id
            )));
        }
        read_snapshot(&path).await
    }

    /// Every stored snapshot, newest first. Unreadable files are skipped.
    pub async fn list_all(&self) -> Result<Vec<MetricsSnapshot>, PipelineError> {
        let mut snapshots = Vec::new();
        if !fs::try_exists(&self.metrics_dir).await? {
            return Ok(snapshots);
        }

        let mut entries = fs::read_dir(&self.metrics_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_metrics = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(METRICS_SUFFIX));
            if !is_metrics {
                continue;
            }

            match read_snapshot(&path).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => error!("Failed to load metrics from {}: {}", path.display(), e),
            }
        }

        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }
}

async fn read_snapshot(path: &Path) -> Result<MetricsSnapshot, PipelineError> {
    let raw = fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::brief;
    use crate::models::FinalStatus;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn snapshot(id: &str, status: FinalStatus) -> MetricsSnapshot {
        MetricsSnapshot::new(id, &brief(&["A", "B"]), status, BTreeMap::new(), "reason")
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let dir = TempDir::new().unwrap();
        let store = MetricsStore::new(dir.path().join("metrics"));

        let path = store
            .save(&snapshot("abc12345", FinalStatus::FailedCompliance))
            .await
            .unwrap();
        assert!(path.ends_with("abc12345_metrics.json"));

        let loaded = store.get("abc12345").await.unwrap();
        assert_eq!(loaded.final_status, FinalStatus::FailedCompliance);
        assert_eq!(loaded.campaign_brief.products.len(), 2);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["final_status"], "failed_compliance");
        assert_eq!(raw["summary"]["total_products"], 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = MetricsStore::new(dir.path());
        assert!(matches!(
            store.get("nope").await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_all_newest_first_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let store = MetricsStore::new(dir.path());

        let mut older = snapshot("old00000", FinalStatus::Completed);
        older.timestamp = older.timestamp - Duration::hours(1);
        store.save(&older).await.unwrap();
        store
            .save(&snapshot("new00000", FinalStatus::FailedTechnical))
            .await
            .unwrap();
        std::fs::write(dir.path().join("bad_metrics.json"), b"{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let all = store.list_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|s| s.campaign_id.as_str()).collect();
        assert_eq!(ids, vec!["new00000", "old00000"]);
    }
}
