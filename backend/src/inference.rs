use std::path::Path;

use log::info;
use serde::Serialize;

use crate::artifact::ModelArtifact;
use crate::error::Result;
use crate::features::FeatureSchema;
use crate::models::{Prediction, PredictionRequest};

/// Loaded classifier. Built once at startup and shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct ModelInference {
    artifact: ModelArtifact,
}

impl ModelInference {
    /// Load the model file and check it against the service's feature schema.
    ///
    /// Fails with `ModelNotFound` when the file is absent; the service must not
    /// start without a model.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let artifact = ModelArtifact::load(model_path)?;
        let model = Self::from_artifact(artifact)?;
        info!(
            "Model loaded from {} ({} trees, trained {})",
            model_path.display(),
            model.artifact.model.n_trees(),
            model.artifact.created_at.to_rfc3339()
        );
        Ok(model)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifact.ensure_schema(&FeatureSchema::diabetes())?;
        Ok(Self { artifact })
    }

    pub fn predict(&self, features: &PredictionRequest) -> Result<Prediction> {
        let row = features.to_feature_row(&self.artifact.schema)?;
        let label = self.artifact.model.predict(&row)?;
        let [_, positive] = self.artifact.model.predict_proba(&row)?;
        Ok(Prediction {
            label,
            probability: positive,
        })
    }

    pub fn get_model_info(&self) -> ModelInfo {
        let params = self.artifact.model.params();
        ModelInfo {
            format_version: self.artifact.format_version,
            schema_version: self.artifact.schema.version,
            features: self.artifact.schema.names(),
            n_estimators: params.n_trees,
            max_depth: params.max_depth,
            created_at: self.artifact.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub format_version: u32,
    pub schema_version: u32,
    pub features: Vec<String>,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub created_at: String,
}
