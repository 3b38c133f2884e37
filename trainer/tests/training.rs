//! End-to-end training against a local CSV and a local tracking store.

use diabetes_api::artifact::ModelArtifact;
use diabetes_api::forest::ForestParams;
use diabetes_api::inference::ModelInference;
use diabetes_api::models::PredictionRequest;
use diabetes_api::tracking::{LocalTracking, RunStatus};
use diabetes_trainer::dataset::DataSource;
use diabetes_trainer::{train, TrainConfig, TrainError};
use tempfile::TempDir;

fn write_dataset(dir: &TempDir, n: usize) -> std::path::PathBuf {
    let mut csv = String::from(
        "Pregnancies,Glucose,BloodPressure,SkinThickness,Insulin,BMI,DiabetesPedigreeFunction,Age,Outcome\n",
    );
    for i in 0..n {
        let glucose = 70 + (i * 37) % 130;
        let bmi = 20.0 + ((i * 7) % 25) as f64;
        let outcome = u8::from(glucose as f64 + bmi > 165.0);
        csv.push_str(&format!(
            "{},{},{},20,0,{},0.5,{},{}\n",
            i % 8,
            glucose,
            55 + (i * 13) % 40,
            bmi,
            21 + (i * 11) % 50,
            outcome
        ));
    }
    let path = dir.path().join("diabetes.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn config(dir: &TempDir) -> TrainConfig {
    TrainConfig {
        data_source: DataSource::Path(write_dataset(dir, 250)),
        model_path: dir.path().join("model/diabetes_rf_model.bin"),
        tracking_uri: dir.path().join("mlruns").display().to_string(),
        forest: ForestParams {
            n_trees: 15,
            ..ForestParams::default()
        },
        ..TrainConfig::default()
    }
}

#[tokio::test]
async fn training_saves_model_and_records_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let tracking = LocalTracking::new(&config.tracking_uri);

    let summary = train(&config, &tracking).await.unwrap();
    assert_eq!(summary.n_test, 50);
    assert!(summary.model_path.exists());

    let runs = tracking
        .list_runs("Diabetes-Prediction-Training")
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.run_name, "diabetes_rf_training");
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.params["n_estimators"], "15");
    assert_eq!(run.params["max_depth"], "5");
    assert_eq!(run.metrics["accuracy"], summary.metrics.accuracy);
    assert_eq!(run.metrics["mse"], summary.metrics.mse);

    let copied = dir
        .path()
        .join("mlruns/Diabetes-Prediction-Training")
        .join(&run.run_id)
        .join("artifacts/model/diabetes_rf_model.bin");
    assert!(copied.exists());
}

#[tokio::test]
async fn trained_model_is_servable() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let tracking = LocalTracking::new(&config.tracking_uri);
    train(&config, &tracking).await.unwrap();

    let model = ModelInference::load(&config.model_path).unwrap();
    let request: PredictionRequest = serde_json::from_str(
        r#"{"Pregnancies": 2, "Glucose": 120.0, "BloodPressure": 70.0, "BMI": 28.5, "Age": 33}"#,
    )
    .unwrap();
    let first = model.predict(&request).unwrap();
    let second = model.predict(&request).unwrap();
    assert_eq!(first, second);
    assert!((0.0..=1.0).contains(&first.probability));
}

#[tokio::test]
async fn retraining_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let tracking = LocalTracking::new(&config.tracking_uri);

    let first = train(&config, &tracking).await.unwrap();
    let first_model = ModelArtifact::load(&config.model_path).unwrap().model;
    let second = train(&config, &tracking).await.unwrap();
    let second_model = ModelArtifact::load(&config.model_path).unwrap().model;

    assert_eq!(first.metrics.mse.to_bits(), second.metrics.mse.to_bits());
    assert_eq!(first.metrics.r2.to_bits(), second.metrics.r2.to_bits());
    assert_eq!(
        first.metrics.accuracy.to_bits(),
        second.metrics.accuracy.to_bits()
    );
    assert_eq!(first_model, second_model);
    assert_ne!(first.run.run_id, second.run.run_id);
}

#[tokio::test]
async fn missing_dataset_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = TrainConfig {
        data_source: DataSource::Path(dir.path().join("absent.csv")),
        ..config(&dir)
    };
    let tracking = LocalTracking::new(&config.tracking_uri);

    let err = train(&config, &tracking).await.unwrap_err();
    assert!(matches!(err, TrainError::Dataset(_)));
    assert!(!config.model_path.exists());
}
