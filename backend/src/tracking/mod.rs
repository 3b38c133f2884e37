//! Write-only client for the experiment tracking backend.
//!
//! Two backends are supported, chosen from the tracking URI the same way MLflow
//! chooses its store: `http://` / `https://` URIs talk to an MLflow tracking
//! server over its REST API, anything else is a local directory.

mod local;
mod rest;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalTracking;
pub use rest::RestTracking;

pub const DEFAULT_TRACKING_URI: &str = "mlruns";

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracking API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

/// Identifies a run inside its experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub experiment_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// A local file to attach to a run under `artifact_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRef {
    pub local_path: PathBuf,
    pub artifact_path: String,
}

/// Everything written to a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRecord {
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<ArtifactRef>,
}

#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Look up an experiment by name, creating it when absent. Returns its id.
    async fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError>;

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
    ) -> Result<RunHandle, TrackingError>;

    async fn log_batch(
        &self,
        run: &RunHandle,
        params: &BTreeMap<String, String>,
        metrics: &BTreeMap<String, f64>,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), TrackingError>;

    async fn log_artifact(
        &self,
        run: &RunHandle,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<(), TrackingError>;

    async fn finish_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), TrackingError>;
}

/// Build the client for a tracking URI.
pub fn client_for_uri(uri: &str) -> Result<Arc<dyn TrackingClient>, TrackingError> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Ok(Arc::new(RestTracking::new(uri)?))
    } else {
        let root = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(Arc::new(LocalTracking::new(root)))
    }
}

/// Write `record` as one run: create it, log everything, then close it.
///
/// If any write fails after the run exists, the run is closed as `FAILED`
/// and the original error is returned.
pub async fn record_run(
    client: &dyn TrackingClient,
    experiment: &str,
    run_name: &str,
    record: &RunRecord,
) -> Result<RunHandle, TrackingError> {
    let experiment_id = client.get_or_create_experiment(experiment).await?;
    let run = client.create_run(&experiment_id, run_name).await?;
    debug!("Opened run {} in experiment {}", run.run_id, experiment);

    match write_run(client, &run, record).await {
        Ok(()) => {
            client.finish_run(&run, RunStatus::Finished).await?;
            Ok(run)
        }
        Err(e) => {
            if let Err(close_err) = client.finish_run(&run, RunStatus::Failed).await {
                warn!("Could not mark run {} as failed: {}", run.run_id, close_err);
            }
            Err(e)
        }
    }
}

async fn write_run(
    client: &dyn TrackingClient,
    run: &RunHandle,
    record: &RunRecord,
) -> Result<(), TrackingError> {
    client
        .log_batch(run, &record.params, &record.metrics, &record.tags)
        .await?;
    for artifact in &record.artifacts {
        client
            .log_artifact(run, &artifact.local_path, &artifact.artifact_path)
            .await?;
    }
    Ok(())
}
