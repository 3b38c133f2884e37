//! Best-effort recording of predictions to the tracking backend.
//!
//! Every attempt writes one complete run (params, metrics, two tags). A failed
//! attempt is retried from scratch after the policy delay; once the attempts
//! are used up the record is dropped with a warning. Nothing here can fail the
//! HTTP response that produced the record.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, warn};

use crate::tracking::{record_run, RunRecord, TrackingClient};

pub const DEFAULT_EXPERIMENT: &str = "Diabetes-Prediction-Inference";
pub const DEFAULT_SOURCE: &str = "actix-web";
pub const RUN_NAME: &str = "inference_log";

/// Bounded retry with a fixed base delay and an optional growth factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
            multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            multiplier: 1.0,
        }
    }

    /// Wait before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.delay.mul_f64(self.multiplier.powi(exponent))
    }
}

/// Where the retry loop runs relative to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDispatch {
    /// Spawned task; the response does not wait.
    Background,
    /// Awaited by the handler before it responds. Failures are still swallowed.
    Inline,
}

impl FromStr for LogDispatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(LogDispatch::Background),
            "inline" => Ok(LogDispatch::Inline),
            other => Err(format!("unknown inference log mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Delivered { attempts: u32 },
    Dropped { attempts: u32 },
}

pub struct InferenceLogger {
    client: Arc<dyn TrackingClient>,
    experiment: String,
    source: String,
    policy: RetryPolicy,
}

impl InferenceLogger {
    pub fn new(client: Arc<dyn TrackingClient>, experiment: &str, policy: RetryPolicy) -> Self {
        Self {
            client,
            experiment: experiment.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            policy,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn record(&self, params: BTreeMap<String, String>, metrics: BTreeMap<String, f64>) -> RunRecord {
        let tags = BTreeMap::from([
            (
                "inference_time".to_string(),
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            ("source".to_string(), self.source.clone()),
        ]);
        RunRecord {
            params,
            metrics,
            tags,
            artifacts: Vec::new(),
        }
    }

    /// Write one inference run, retrying per the policy.
    pub async fn log(
        &self,
        params: BTreeMap<String, String>,
        metrics: BTreeMap<String, f64>,
    ) -> LogOutcome {
        let record = self.record(params, metrics);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match record_run(self.client.as_ref(), &self.experiment, RUN_NAME, &record).await {
                Ok(run) => {
                    debug!("Inference logged as run {} (attempt {})", run.run_id, attempt);
                    return LogOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    warn!(
                        "Tracking write failed (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        warn!(
            "Dropping inference record after {} failed attempts",
            max_attempts
        );
        LogOutcome::Dropped {
            attempts: max_attempts,
        }
    }

    /// Log according to `mode`. Background mode spawns on the current actix runtime.
    pub async fn dispatch(
        self: &Arc<Self>,
        mode: LogDispatch,
        params: BTreeMap<String, String>,
        metrics: BTreeMap<String, f64>,
    ) {
        match mode {
            LogDispatch::Inline => {
                self.log(params, metrics).await;
            }
            LogDispatch::Background => {
                let logger = Arc::clone(self);
                actix_web::rt::spawn(async move {
                    logger.log(params, metrics).await;
                });
            }
        }
    }
}
