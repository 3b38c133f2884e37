//! Feature schema shared by the validator, the trainer, the model file and the API.
//!
//! The schema is stored inside every model artifact and compared against
//! [`FeatureSchema::diabetes`] when the service loads a model, so a model
//! trained on another column order is rejected instead of silently mispredicting.

use serde::{Deserialize, Serialize};

/// Label column of the training dataset.
pub const LABEL_COLUMN: &str = "Outcome";

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    fn new(name: &str, kind: FeatureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Ordered, typed list of model inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// The five inputs the diabetes model is trained on, in training order.
    pub fn diabetes() -> Self {
        Self {
            version: SCHEMA_VERSION,
            features: vec![
                FeatureSpec::new("Pregnancies", FeatureKind::Integer),
                FeatureSpec::new("Glucose", FeatureKind::Continuous),
                FeatureSpec::new("BloodPressure", FeatureKind::Continuous),
                FeatureSpec::new("BMI", FeatureKind::Continuous),
                FeatureSpec::new("Age", FeatureKind::Integer),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Feature columns followed by the label column.
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns = self.names();
        columns.push(LABEL_COLUMN.to_string());
        columns
    }
}
