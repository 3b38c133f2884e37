//! Training pipeline: load, split, fit, evaluate, save, record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use diabetes_api::artifact::ModelArtifact;
use diabetes_api::config::DEFAULT_MODEL_PATH;
use diabetes_api::features::FeatureSchema;
use diabetes_api::forest::{ForestParams, RandomForest};
use diabetes_api::tracking::{
    record_run, ArtifactRef, RunHandle, RunRecord, TrackingClient, TrackingError,
    DEFAULT_TRACKING_URI,
};
use diabetes_api::ModelError;
use log::info;
use ndarray::Axis;
use thiserror::Error;

use crate::dataset::{DataSource, Dataset, DatasetError};
use crate::metrics::EvaluationMetrics;
use crate::splitter::train_test_split;

pub const DEFAULT_EXPERIMENT: &str = "Diabetes-Prediction-Training";
pub const RUN_NAME: &str = "diabetes_rf_training";
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("tracking failed: {0}")]
    Tracking(#[from] TrackingError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub data_source: DataSource,
    pub model_path: PathBuf,
    pub experiment: String,
    pub run_name: String,
    pub tracking_uri: String,
    pub forest: ForestParams,
    pub test_size: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_source: DataSource::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            experiment: DEFAULT_EXPERIMENT.to_string(),
            run_name: RUN_NAME.to_string(),
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            forest: ForestParams::default(),
            test_size: DEFAULT_TEST_SIZE,
        }
    }
}

impl TrainConfig {
    /// Parameters recorded with the training run.
    pub fn run_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("n_estimators".to_string(), self.forest.n_trees.to_string()),
            ("max_depth".to_string(), self.forest.max_depth.to_string()),
            ("seed".to_string(), self.forest.seed.to_string()),
            ("test_size".to_string(), self.test_size.to_string()),
        ])
    }
}

/// A fitted model and how it scored on the held-out rows.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub artifact: ModelArtifact,
    pub metrics: EvaluationMetrics,
    pub n_train: usize,
    pub n_test: usize,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub model_path: PathBuf,
    pub metrics: EvaluationMetrics,
    pub run: RunHandle,
    pub n_train: usize,
    pub n_test: usize,
}

/// Split, fit and evaluate without touching the filesystem.
pub fn fit_and_evaluate(dataset: &Dataset, config: &TrainConfig) -> Result<FittedModel, TrainError> {
    let schema = FeatureSchema::diabetes();
    let (x, y) = dataset.to_training_data(&schema)?;
    let split = train_test_split(y.len(), config.test_size, config.forest.seed);

    let x_train = x.select(Axis(0), &split.train);
    let y_train: Vec<u8> = split.train.iter().map(|&i| y[i]).collect();
    let x_test = x.select(Axis(0), &split.test);
    let y_test: Vec<u8> = split.test.iter().map(|&i| y[i]).collect();

    info!(
        "Fitting {} trees (max depth {}) on {} rows",
        config.forest.n_trees,
        config.forest.max_depth,
        y_train.len()
    );
    let forest = RandomForest::fit(&x_train, &y_train, config.forest)?;
    let predictions = forest.predict_matrix(&x_test)?;
    let metrics = EvaluationMetrics::compute(&y_test, &predictions);

    Ok(FittedModel {
        artifact: ModelArtifact::new(schema, forest)?,
        metrics,
        n_train: y_train.len(),
        n_test: y_test.len(),
    })
}

/// Run the whole pipeline and record it as one tracking run.
///
/// The model file is written before the run is recorded, so a tracking
/// failure leaves the file in place and returns an error.
pub async fn train(
    config: &TrainConfig,
    tracking: &dyn TrackingClient,
) -> Result<TrainingSummary, TrainError> {
    let dataset = Dataset::load(&config.data_source).await?;
    let fitted = fit_and_evaluate(&dataset, config)?;
    fitted.artifact.save(&config.model_path)?;

    let metrics = fitted.metrics;
    let record = RunRecord {
        params: config.run_params(),
        metrics: BTreeMap::from([
            ("mse".to_string(), metrics.mse),
            ("r2".to_string(), metrics.r2),
            ("accuracy".to_string(), metrics.accuracy),
        ]),
        tags: BTreeMap::new(),
        artifacts: vec![ArtifactRef {
            local_path: config.model_path.clone(),
            artifact_path: "model".to_string(),
        }],
    };
    let run = record_run(tracking, &config.experiment, &config.run_name, &record).await?;
    info!(
        "Training run {} recorded in experiment {}",
        run.run_id, config.experiment
    );

    Ok(TrainingSummary {
        model_path: config.model_path.clone(),
        metrics,
        run,
        n_train: fitted.n_train,
        n_test: fitted.n_test,
    })
}
