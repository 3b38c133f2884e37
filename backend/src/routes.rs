use std::sync::Arc;

use actix_web::{
    error::{InternalError, JsonPayloadError},
    web, HttpRequest, HttpResponse, Responder, ResponseError,
};
use log::{error, info};

use crate::inference::ModelInference;
use crate::inference_log::{InferenceLogger, LogDispatch};
use crate::models::{ErrorDetail, PredictionRequest, PredictionResponse, StatusMessage};

pub const STATUS_MESSAGE: &str = "Diabetes Prediction API is running with MLflow logging.";

const JSON_LIMIT: usize = 64 * 1024;

/// Process-wide service context, built once in `main` and injected into handlers.
pub struct AppState {
    pub model: Arc<ModelInference>,
    pub logger: Arc<InferenceLogger>,
    pub dispatch: LogDispatch,
}

impl AppState {
    pub fn new(model: ModelInference, logger: InferenceLogger, dispatch: LogDispatch) -> Self {
        Self {
            model: Arc::new(model),
            logger: Arc::new(logger),
            dispatch,
        }
    }
}

async fn home() -> impl Responder {
    HttpResponse::Ok().json(StatusMessage::new(STATUS_MESSAGE))
}

async fn model_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.model.get_model_info())
}

async fn predict(state: web::Data<AppState>, req: web::Json<PredictionRequest>) -> HttpResponse {
    let features = req.into_inner();
    let model = Arc::clone(&state.model);

    let prediction = match web::block(move || model.predict(&features)).await {
        Ok(Ok(prediction)) => prediction,
        Ok(Err(e)) => {
            error!("Prediction failed: {}", e);
            return e.error_response();
        }
        Err(e) => {
            error!("Blocking prediction task failed: {}", e);
            return HttpResponse::InternalServerError().json(ErrorDetail {
                detail: "prediction task failed".to_string(),
            });
        }
    };

    info!("Received request: {:?}", features);
    info!(
        "Prediction: {}, Probability: {}",
        prediction.label, prediction.probability
    );

    state
        .logger
        .dispatch(state.dispatch, features.as_params(), prediction.as_metrics())
        .await;

    HttpResponse::Ok().json(PredictionResponse::new(prediction, features))
}

/// JSON extractor settings: malformed bodies become 422 with a `detail` message.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(json_error_handler)
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = match &err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            HttpResponse::PayloadTooLarge().json(ErrorDetail {
                detail: err.to_string(),
            })
        }
        _ => HttpResponse::UnprocessableEntity().json(ErrorDetail {
            detail: err.to_string(),
        }),
    };
    InternalError::from_response(err, response).into()
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorDetail {
        detail: "Not Found".to_string(),
    })
}

/// Register every route; shared by `main` and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/", web::get().to(home))
        .route("/model-info", web::get().to(model_info))
        .route("/predict", web::post().to(predict))
        .default_service(web::route().to(not_found));
}
