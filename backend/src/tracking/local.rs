//! Directory-backed tracking store.
//!
//! Layout: `<root>/<experiment>/<run_id>/run.json` plus an `artifacts/` tree
//! next to it. Experiment names are used as directory names after replacing
//! path separators.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use super::{RunHandle, RunStatus, TrackingClient, TrackingError};

const RUN_FILE: &str = "run.json";

/// Contents of `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

pub struct LocalTracking {
    root: PathBuf,
}

impl LocalTracking {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run: &RunHandle) -> PathBuf {
        self.root.join(&run.experiment_id).join(&run.run_id)
    }

    /// Read back a stored run.
    pub async fn read_run(&self, run: &RunHandle) -> Result<StoredRun, TrackingError> {
        let raw = fs::read(self.run_dir(run).join(RUN_FILE)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write_run(&self, run: &RunHandle, stored: &StoredRun) -> Result<(), TrackingError> {
        let raw = serde_json::to_vec_pretty(stored)?;
        fs::write(self.run_dir(run).join(RUN_FILE), raw).await?;
        Ok(())
    }

    /// All runs recorded under an experiment, in no particular order.
    pub async fn list_runs(&self, experiment: &str) -> Result<Vec<StoredRun>, TrackingError> {
        let experiment_id = experiment_dir_name(experiment);
        let mut runs = Vec::new();
        let mut entries = match fs::read_dir(self.root.join(&experiment_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let handle = RunHandle {
                experiment_id: experiment_id.clone(),
                run_id: entry.file_name().to_string_lossy().into_owned(),
            };
            runs.push(self.read_run(&handle).await?);
        }
        Ok(runs)
    }
}

fn experiment_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

#[async_trait]
impl TrackingClient for LocalTracking {
    async fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        if name.trim().is_empty() {
            return Err(TrackingError::Backend("experiment name is empty".to_string()));
        }
        let id = experiment_dir_name(name);
        fs::create_dir_all(self.root.join(&id)).await?;
        Ok(id)
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
    ) -> Result<RunHandle, TrackingError> {
        let run = RunHandle {
            experiment_id: experiment_id.to_string(),
            run_id: Uuid::new_v4().simple().to_string(),
        };
        fs::create_dir_all(self.run_dir(&run)).await?;
        let stored = StoredRun {
            run_id: run.run_id.clone(),
            run_name: run_name.to_string(),
            experiment: experiment_id.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now().timestamp_millis(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        self.write_run(&run, &stored).await?;
        Ok(run)
    }

    async fn log_batch(
        &self,
        run: &RunHandle,
        params: &BTreeMap<String, String>,
        metrics: &BTreeMap<String, f64>,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), TrackingError> {
        let mut stored = self.read_run(run).await?;
        stored
            .params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        stored
            .metrics
            .extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        stored
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_run(run, &stored).await
    }

    async fn log_artifact(
        &self,
        run: &RunHandle,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<(), TrackingError> {
        let file_name = local_path.file_name().ok_or_else(|| {
            TrackingError::Backend(format!("bad artifact path {}", local_path.display()))
        })?;
        let target_dir = self
            .run_dir(run)
            .join("artifacts")
            .join(artifact_path.trim_matches('/'));
        fs::create_dir_all(&target_dir).await?;
        fs::copy(local_path, target_dir.join(file_name)).await?;
        Ok(())
    }

    async fn finish_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), TrackingError> {
        let mut stored = self.read_run(run).await?;
        stored.status = status;
        stored.end_time = Some(Utc::now().timestamp_millis());
        self.write_run(run, &stored).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{record_run, ArtifactRef, RunRecord};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_run_persists_everything() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("model.bin");
        std::fs::write(&artifact, b"weights").unwrap();

        let store = LocalTracking::new(dir.path().join("mlruns"));
        let record = RunRecord {
            params: BTreeMap::from([("max_depth".to_string(), "5".to_string())]),
            metrics: BTreeMap::from([("mse".to_string(), 0.25)]),
            tags: BTreeMap::from([("source".to_string(), "test".to_string())]),
            artifacts: vec![ArtifactRef {
                local_path: artifact.clone(),
                artifact_path: "model".to_string(),
            }],
        };

        let run = record_run(&store, "Diabetes-Prediction-Training", "train", &record)
            .await
            .unwrap();
        let stored = store.read_run(&run).await.unwrap();

        assert_eq!(stored.status, RunStatus::Finished);
        assert_eq!(stored.run_name, "train");
        assert_eq!(stored.params["max_depth"], "5");
        assert_eq!(stored.metrics["mse"], 0.25);
        assert_eq!(stored.tags["source"], "test");
        assert!(stored.end_time.is_some());

        let copied = store
            .root()
            .join(&run.experiment_id)
            .join(&run.run_id)
            .join("artifacts/model/model.bin");
        assert_eq!(std::fs::read(copied).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_missing_artifact_marks_run_failed() {
        let dir = tempdir().unwrap();
        let store = LocalTracking::new(dir.path());
        let record = RunRecord {
            artifacts: vec![ArtifactRef {
                local_path: dir.path().join("nope.bin"),
                artifact_path: "model".to_string(),
            }],
            ..RunRecord::default()
        };

        assert!(record_run(&store, "exp", "train", &record).await.is_err());
        let runs = store.list_runs("exp").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_each_run_gets_its_own_directory() {
        let dir = tempdir().unwrap();
        let store = LocalTracking::new(dir.path());
        for _ in 0..3 {
            record_run(&store, "inference", "inference_log", &RunRecord::default())
                .await
                .unwrap();
        }
        assert_eq!(store.list_runs("inference").await.unwrap().len(), 3);
        assert!(store.list_runs("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_experiment_name_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalTracking::new(dir.path());
        assert!(store.get_or_create_experiment("  ").await.is_err());
    }

    #[test]
    fn test_experiment_dir_name_replaces_separators() {
        assert_eq!(experiment_dir_name("a/b\\c"), "a_b_c");
    }
}
