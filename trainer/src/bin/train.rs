use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use diabetes_api::config::DEFAULT_MODEL_PATH;
use diabetes_api::forest::ForestParams;
use diabetes_api::tracking::{client_for_uri, DEFAULT_TRACKING_URI};
use diabetes_trainer::dataset::{DataSource, DEFAULT_DATA_URL};
use diabetes_trainer::train::{DEFAULT_EXPERIMENT, DEFAULT_TEST_SIZE, RUN_NAME};
use diabetes_trainer::{train, TrainConfig};
use env_logger::Env;
use log::{error, info};

/// Train the diabetes random forest and record the run.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// CSV location: an http(s) URL or a local path
    #[arg(long, default_value = DEFAULT_DATA_URL)]
    data_source: String,

    /// Where the model file is written (overwritten if present)
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    experiment: String,

    /// MLflow server URL or local store directory
    #[arg(long, env = "MLFLOW_TRACKING_URI", default_value = DEFAULT_TRACKING_URI)]
    tracking_uri: String,

    #[arg(long, default_value_t = 100)]
    n_estimators: usize,

    #[arg(long, default_value_t = 5)]
    max_depth: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = DEFAULT_TEST_SIZE)]
    test_size: f64,
}

impl Args {
    fn into_config(self) -> Result<TrainConfig> {
        if !(0.0..1.0).contains(&self.test_size) {
            anyhow::bail!("--test-size must be in [0, 1), got {}", self.test_size);
        }
        let data_source = self
            .data_source
            .parse::<DataSource>()
            .context("invalid data source")?;
        Ok(TrainConfig {
            data_source,
            model_path: self.model_path,
            experiment: self.experiment,
            run_name: RUN_NAME.to_string(),
            tracking_uri: self.tracking_uri,
            forest: ForestParams {
                n_trees: self.n_estimators,
                max_depth: self.max_depth,
                seed: self.seed,
                ..ForestParams::default()
            },
            test_size: self.test_size,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let config = Args::parse().into_config()?;
    info!("🌲 Training from {}", config.data_source);

    let tracking = client_for_uri(&config.tracking_uri)
        .with_context(|| format!("invalid tracking URI {}", config.tracking_uri))?;

    let summary = match train(&config, tracking.as_ref()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("❌ Training failed: {}", e);
            return Err(e).context("training failed");
        }
    };

    let metrics = summary.metrics;
    println!("Model saved to {}", summary.model_path.display());
    println!(
        "MSE: {:.4}, R2: {:.4}, Accuracy: {:.4}",
        metrics.mse, metrics.r2, metrics.accuracy
    );
    Ok(())
}
