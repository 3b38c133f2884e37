//! Offline side of the diabetes prediction service: dataset validation and
//! model training.

pub mod dataset;
pub mod metrics;
pub mod splitter;
pub mod train;
pub mod validate;

pub use dataset::{DataSource, Dataset, DatasetError};
pub use train::{train, TrainConfig, TrainError, TrainingSummary};
pub use validate::{validate_dataset, ValidationError, ValidationOutcome, ValidationReport};
