//! MLflow tracking server client (REST API 2.0).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{RunHandle, RunStatus, TrackingClient, TrackingError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

pub struct RestTracking {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct Metric<'a> {
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: i64,
}

#[derive(Serialize)]
struct LogBatchRequest<'a> {
    run_id: &'a str,
    params: Vec<KeyValue<'a>>,
    metrics: Vec<Metric<'a>>,
    tags: Vec<KeyValue<'a>>,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a str,
    run_name: &'a str,
    start_time: i64,
    tags: Vec<KeyValue<'a>>,
}

#[derive(Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    end_time: i64,
}

#[derive(Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

/// MLflow error body, e.g. `{"error_code": "RESOURCE_DOES_NOT_EXIST", ...}`.
#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: String,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
}

#[derive(Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    run: Run,
}

impl RestTracking {
    pub fn new(base_url: &str) -> Result<Self, TrackingError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    fn artifact_url(&self, run: &RunHandle, artifact_path: &str, file_name: &str) -> String {
        let mut url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}/artifacts",
            self.base_url, run.experiment_id, run.run_id
        );
        let artifact_path = artifact_path.trim_matches('/');
        if !artifact_path.is_empty() {
            url.push('/');
            url.push_str(artifact_path);
        }
        url.push('/');
        url.push_str(file_name);
        url
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, TrackingError> {
        let resp = self.client.post(self.endpoint(path)).json(body).send().await?;
        check_response(resp).await
    }
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, TrackingError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(TrackingError::Api { status, message })
}

fn key_values(map: &BTreeMap<String, String>) -> Vec<KeyValue<'_>> {
    map.iter()
        .map(|(key, value)| KeyValue { key, value })
        .collect()
}

#[async_trait]
impl TrackingClient for RestTracking {
    async fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let url = Url::parse_with_params(
            &self.endpoint("experiments/get-by-name"),
            &[("experiment_name", name)],
        )
        .map_err(|e| TrackingError::Backend(format!("invalid tracking URI: {e}")))?;

        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            let message = resp.text().await.unwrap_or_default();
            let missing = serde_json::from_str::<ApiErrorBody>(&message)
                .map(|body| body.error_code == RESOURCE_DOES_NOT_EXIST)
                .unwrap_or(false);
            if !missing {
                return Err(TrackingError::Api {
                    status: StatusCode::NOT_FOUND.as_u16(),
                    message,
                });
            }

            let created: CreateExperimentResponse = self
                .post("experiments/create", &serde_json::json!({ "name": name }))
                .await?
                .json()
                .await?;
            log::info!("Created experiment '{}' ({})", name, created.experiment_id);
            return Ok(created.experiment_id);
        }

        let found: GetExperimentResponse = check_response(resp).await?.json().await?;
        Ok(found.experiment.experiment_id)
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
    ) -> Result<RunHandle, TrackingError> {
        let body = CreateRunRequest {
            experiment_id,
            run_name,
            start_time: Utc::now().timestamp_millis(),
            tags: vec![KeyValue {
                key: "mlflow.runName",
                value: run_name,
            }],
        };
        let created: CreateRunResponse = self.post("runs/create", &body).await?.json().await?;
        Ok(RunHandle {
            experiment_id: experiment_id.to_string(),
            run_id: created.run.info.run_id,
        })
    }

    async fn log_batch(
        &self,
        run: &RunHandle,
        params: &BTreeMap<String, String>,
        metrics: &BTreeMap<String, f64>,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), TrackingError> {
        let timestamp = Utc::now().timestamp_millis();
        let body = LogBatchRequest {
            run_id: &run.run_id,
            params: key_values(params),
            metrics: metrics
                .iter()
                .map(|(key, &value)| Metric {
                    key,
                    value,
                    timestamp,
                    step: 0,
                })
                .collect(),
            tags: key_values(tags),
        };
        self.post("runs/log-batch", &body).await?;
        Ok(())
    }

    async fn log_artifact(
        &self,
        run: &RunHandle,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<(), TrackingError> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TrackingError::Backend(format!("bad artifact path {}", local_path.display()))
            })?;
        let bytes = tokio::fs::read(local_path).await?;
        let resp = self
            .client
            .put(self.artifact_url(run, artifact_path, file_name))
            .body(bytes)
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    async fn finish_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), TrackingError> {
        let body = UpdateRunRequest {
            run_id: &run.run_id,
            status,
            end_time: Utc::now().timestamp_millis(),
        };
        self.post("runs/update", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use std::sync::Mutex;

    fn handle() -> RunHandle {
        RunHandle {
            experiment_id: "3".to_string(),
            run_id: "r1".to_string(),
        }
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = RestTracking::new("http://localhost:5000/").unwrap();
        assert_eq!(
            client.endpoint("runs/create"),
            "http://localhost:5000/api/2.0/mlflow/runs/create"
        );
    }

    #[test]
    fn test_artifact_url() {
        let client = RestTracking::new("http://mlflow:5000").unwrap();
        assert_eq!(
            client.artifact_url(&handle(), "model", "diabetes_rf_model.bin"),
            "http://mlflow:5000/api/2.0/mlflow-artifacts/artifacts/3/r1/artifacts/model/diabetes_rf_model.bin"
        );
        assert_eq!(
            client.artifact_url(&handle(), "", "a.bin"),
            "http://mlflow:5000/api/2.0/mlflow-artifacts/artifacts/3/r1/artifacts/a.bin"
        );
    }

    #[test]
    fn test_log_batch_payload_shape() {
        let params = BTreeMap::from([("Age".to_string(), "33".to_string())]);
        let body = LogBatchRequest {
            run_id: "r1",
            params: key_values(&params),
            metrics: vec![Metric {
                key: "predicted_label",
                value: 1.0,
                timestamp: 10,
                step: 0,
            }],
            tags: Vec::new(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["params"][0]["key"], "Age");
        assert_eq!(json["params"][0]["value"], "33");
        assert_eq!(json["metrics"][0]["value"], 1.0);
    }

    #[test]
    fn test_update_payload_status() {
        let body = UpdateRunRequest {
            run_id: "r1",
            status: RunStatus::Failed,
            end_time: 0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "FAILED");
    }

    #[derive(Clone, Copy)]
    enum Lookup {
        Found,
        Missing,
        NotMlflow,
    }

    struct Stub {
        lookup: Lookup,
        calls: Mutex<Vec<String>>,
    }

    async fn stub_handler(req: HttpRequest, stub: web::Data<Stub>) -> HttpResponse {
        stub.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", req.method(), req.path()));
        match (req.path(), stub.lookup) {
            ("/api/2.0/mlflow/experiments/get-by-name", Lookup::Found) => HttpResponse::Ok()
                .json(serde_json::json!({"experiment": {"experiment_id": "7", "name": "x"}})),
            ("/api/2.0/mlflow/experiments/get-by-name", Lookup::Missing) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error_code": "RESOURCE_DOES_NOT_EXIST",
                    "message": "Could not find experiment"
                }))
            }
            ("/api/2.0/mlflow/experiments/create", _) => {
                HttpResponse::Ok().json(serde_json::json!({"experiment_id": "8"}))
            }
            _ => HttpResponse::NotFound()
                .content_type("text/html")
                .body("<html>nginx 404</html>"),
        }
    }

    /// Serve `lookup` on an ephemeral port; returns the base URL and call log.
    fn start_stub(lookup: Lookup) -> (String, web::Data<Stub>) {
        let stub = web::Data::new(Stub {
            lookup,
            calls: Mutex::new(Vec::new()),
        });
        let data = stub.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::to(stub_handler))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        (format!("http://{addr}"), stub)
    }

    fn calls(stub: &web::Data<Stub>) -> Vec<String> {
        stub.calls.lock().unwrap().clone()
    }

    #[actix_web::test]
    async fn test_existing_experiment_is_reused() {
        let (url, stub) = start_stub(Lookup::Found);
        let client = RestTracking::new(&url).unwrap();

        assert_eq!(client.get_or_create_experiment("exp").await.unwrap(), "7");
        assert_eq!(
            calls(&stub),
            vec!["GET /api/2.0/mlflow/experiments/get-by-name"]
        );
    }

    #[actix_web::test]
    async fn test_missing_experiment_is_created() {
        let (url, stub) = start_stub(Lookup::Missing);
        let client = RestTracking::new(&url).unwrap();

        assert_eq!(client.get_or_create_experiment("exp").await.unwrap(), "8");
        assert_eq!(
            calls(&stub),
            vec![
                "GET /api/2.0/mlflow/experiments/get-by-name",
                "POST /api/2.0/mlflow/experiments/create"
            ]
        );
    }

    #[actix_web::test]
    async fn test_foreign_404_is_not_treated_as_missing() {
        let (url, stub) = start_stub(Lookup::NotMlflow);
        let client = RestTracking::new(&url).unwrap();

        match client.get_or_create_experiment("exp").await {
            Err(TrackingError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("nginx"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(
            calls(&stub),
            vec!["GET /api/2.0/mlflow/experiments/get-by-name"]
        );
    }

    #[actix_web::test]
    async fn test_error_status_surfaces_body() {
        let (url, _stub) = start_stub(Lookup::Found);
        let client = RestTracking::new(&url).unwrap();

        match client.finish_run(&handle(), RunStatus::Finished).await {
            Err(TrackingError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.contains("nginx"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let client = RestTracking::new("http://127.0.0.1:9").unwrap();
        assert!(client.get_or_create_experiment("any").await.is_err());
    }
}
