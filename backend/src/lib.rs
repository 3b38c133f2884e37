//! Diabetes prediction service.
//!
//! Loads a random-forest model trained by the `train` binary, serves
//! predictions over HTTP and records every inference in the experiment
//! tracking backend on a best-effort basis.

pub mod artifact;
pub mod config;
pub mod error;
pub mod features;
pub mod forest;
pub mod inference;
pub mod inference_log;
pub mod models;
pub mod routes;
pub mod tracking;

pub use error::{ModelError, Result};
