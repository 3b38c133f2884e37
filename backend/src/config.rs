//! Service settings read from the environment.
//!
//! Values come through a lookup function so tests can supply their own
//! variables without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::inference_log::{LogDispatch, RetryPolicy, DEFAULT_EXPERIMENT, DEFAULT_SOURCE};
use crate::tracking::DEFAULT_TRACKING_URI;

pub const DEFAULT_MODEL_PATH: &str = "model/diabetes_rf_model.bin";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub model_path: PathBuf,
    pub tracking_uri: String,
    pub experiment: String,
    pub log_source: String,
    pub log_dispatch: LogDispatch,
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take defaults;
    /// set but unparsable ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = parse_var(&lookup, "PORT", 8080u16)?;
        let workers = parse_var(&lookup, "WORKERS", num_cpus::get())?.max(1);
        let from_env = parse_bool(&lookup, "MODEL_PATH_FROM_ENV", true)?;
        let model_path = match lookup("MODEL_PATH") {
            Some(path) if from_env => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_MODEL_PATH),
        };

        let log_dispatch = match lookup("INFERENCE_LOG_MODE") {
            Some(mode) => mode.parse()?,
            None => LogDispatch::Background,
        };
        let defaults = RetryPolicy::default();
        let max_attempts = parse_var(&lookup, "INFERENCE_LOG_MAX_ATTEMPTS", defaults.max_attempts)?;
        let delay_ms = parse_var(
            &lookup,
            "INFERENCE_LOG_RETRY_DELAY_MS",
            defaults.delay.as_millis() as u64,
        )?;

        Ok(Self {
            host: var_or("HOST", "127.0.0.1"),
            port,
            workers,
            model_path,
            tracking_uri: var_or("MLFLOW_TRACKING_URI", DEFAULT_TRACKING_URI),
            experiment: var_or("INFERENCE_EXPERIMENT", DEFAULT_EXPERIMENT),
            log_source: var_or("INFERENCE_LOG_SOURCE", DEFAULT_SOURCE),
            log_dispatch,
            retry: RetryPolicy::fixed(max_attempts, Duration::from_millis(delay_ms)),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {key}='{raw}': {e}")),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(format!("invalid {key}='{v}': expected a boolean")),
    }
}
