use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Context};
use log::{error, info};

use diabetes_api::config::ServiceConfig;
use diabetes_api::inference::ModelInference;
use diabetes_api::inference_log::InferenceLogger;
use diabetes_api::routes::{self, AppState};
use diabetes_api::tracking;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    info!("🚀 Starting Diabetes Prediction API");

    let config = ServiceConfig::from_env().map_err(|e| anyhow!(e))?;

    // No model, no server.
    let model = match ModelInference::load(&config.model_path) {
        Ok(model) => model,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e).context("cannot start without a model");
        }
    };

    let tracker = tracking::client_for_uri(&config.tracking_uri)
        .with_context(|| format!("invalid tracking URI '{}'", config.tracking_uri))?;
    let logger = InferenceLogger::new(tracker, &config.experiment, config.retry)
        .with_source(&config.log_source);
    let state = web::Data::new(AppState::new(model, logger, config.log_dispatch));

    let bind_address = config.bind_address();
    info!("🌐 Listening on http://{}", bind_address);
    info!("👷 Workers: {}", config.workers);
    info!("📊 Tracking URI: {} (experiment '{}')", config.tracking_uri, config.experiment);
    info!(
        "🔁 Inference logging: {:?}, {} attempts, {:?} apart",
        config.log_dispatch, config.retry.max_attempts, config.retry.delay
    );
    info!("   GET  /            - status");
    info!("   GET  /model-info  - model metadata");
    info!("   POST /predict     - single prediction");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .workers(config.workers)
    .bind(&bind_address)
    .with_context(|| format!("cannot bind {bind_address}"))?
    .run()
    .await?;

    Ok(())
}
