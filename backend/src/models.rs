use std::collections::BTreeMap;

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::features::FeatureSchema;

/// Body of `POST /predict`. Field names follow the dataset columns.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PredictionRequest {
    #[serde(rename = "Pregnancies", deserialize_with = "integral")]
    pub pregnancies: i64,
    #[serde(rename = "Glucose")]
    pub glucose: f64,
    #[serde(rename = "BloodPressure")]
    pub blood_pressure: f64,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "Age", deserialize_with = "integral")]
    pub age: i64,
}

impl PredictionRequest {
    /// Value of the column called `name`, if the request carries it.
    pub fn feature_value(&self, name: &str) -> Option<f64> {
        match name {
            "Pregnancies" => Some(self.pregnancies as f64),
            "Glucose" => Some(self.glucose),
            "BloodPressure" => Some(self.blood_pressure),
            "BMI" => Some(self.bmi),
            "Age" => Some(self.age as f64),
            _ => None,
        }
    }

    /// One feature row in schema order.
    pub fn to_feature_row(&self, schema: &FeatureSchema) -> Result<Vec<f64>> {
        schema
            .features
            .iter()
            .map(|spec| {
                self.feature_value(&spec.name).ok_or_else(|| ModelError::SchemaMismatch {
                    expected: schema.names(),
                    actual: FeatureSchema::diabetes().names(),
                })
            })
            .collect()
    }

    /// Request fields as tracking params.
    pub fn as_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Pregnancies".to_string(), self.pregnancies.to_string()),
            ("Glucose".to_string(), format!("{:?}", self.glucose)),
            ("BloodPressure".to_string(), format!("{:?}", self.blood_pressure)),
            ("BMI".to_string(), format!("{:?}", self.bmi)),
            ("Age".to_string(), self.age.to_string()),
        ])
    }
}

/// Integer field that also takes whole-valued floats such as `2.0`.
fn integral<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IntegralVisitor;

    impl Visitor<'_> for IntegralVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<i64, E> {
            // i64::MAX as f64 rounds up to 2^63, which does not fit.
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(IntegralVisitor)
}

/// Raw model output for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u8,
    pub probability: f64,
}

impl Prediction {
    pub fn as_metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("predicted_label".to_string(), f64::from(self.label)),
            ("predicted_probability".to_string(), self.probability),
        ])
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub prediction: u8,
    pub probability_diabetes: f64,
    pub input_data: PredictionRequest,
}

impl PredictionResponse {
    pub fn new(prediction: Prediction, input_data: PredictionRequest) -> Self {
        Self {
            prediction: prediction.label,
            probability_diabetes: round_probability(prediction.probability),
            input_data,
        }
    }
}

/// Round to 4 decimal places for display.
pub fn round_probability(probability: f64) -> f64 {
    (probability * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Error body shared by validation and internal failures.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorDetail {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> PredictionRequest {
        PredictionRequest {
            pregnancies: 2,
            glucose: 120.0,
            blood_pressure: 70.0,
            bmi: 28.5,
            age: 33,
        }
    }

    #[test]
    fn test_deserialize_dataset_field_names() {
        let body = r#"{"Pregnancies": 2, "Glucose": 120.0, "BloodPressure": 70.0, "BMI": 28.5, "Age": 33}"#;
        let req: PredictionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req, example());
    }

    #[test]
    fn test_float_fields_accept_integers() {
        let body = r#"{"Pregnancies": 0, "Glucose": 99, "BloodPressure": 60, "BMI": 30, "Age": 41}"#;
        let req: PredictionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.glucose, 99.0);
    }

    #[test]
    fn test_integer_fields_reject_fractions() {
        let body = r#"{"Pregnancies": 1.5, "Glucose": 99.0, "BloodPressure": 60.0, "BMI": 30.0, "Age": 41}"#;
        assert!(serde_json::from_str::<PredictionRequest>(body).is_err());
    }

    #[test]
    fn test_integer_fields_accept_whole_floats() {
        let body = r#"{"Pregnancies": 2.0, "Glucose": 120.0, "BloodPressure": 70.0, "BMI": 28.5, "Age": 33.0}"#;
        let req: PredictionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req, example());
        let echoed = serde_json::to_value(req).unwrap();
        assert_eq!(echoed["Pregnancies"], serde_json::json!(2));
        assert!(echoed["Age"].is_i64());
    }

    #[test]
    fn test_integer_fields_reject_strings_and_overflow() {
        let text = r#"{"Pregnancies": "2", "Glucose": 99.0, "BloodPressure": 60.0, "BMI": 30.0, "Age": 41}"#;
        assert!(serde_json::from_str::<PredictionRequest>(text).is_err());
        let huge = r#"{"Pregnancies": 1e300, "Glucose": 99.0, "BloodPressure": 60.0, "BMI": 30.0, "Age": 41}"#;
        assert!(serde_json::from_str::<PredictionRequest>(huge).is_err());
    }

    #[test]
    fn test_missing_field_rejected() {
        let body = r#"{"Pregnancies": 1, "Glucose": 99.0, "BloodPressure": 60.0, "Age": 41}"#;
        assert!(serde_json::from_str::<PredictionRequest>(body).is_err());
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let body = r#"{"Pregnancies": -3, "Glucose": -1.0, "BloodPressure": 900.0, "BMI": 0.0, "Age": 250}"#;
        let req: PredictionRequest = serde_json::from_str(body).unwrap();
        let row = req.to_feature_row(&FeatureSchema::diabetes()).unwrap();
        assert_eq!(row, vec![-3.0, -1.0, 900.0, 0.0, 250.0]);
    }

    #[test]
    fn test_feature_row_follows_schema_order() {
        let row = example().to_feature_row(&FeatureSchema::diabetes()).unwrap();
        assert_eq!(row, vec![2.0, 120.0, 70.0, 28.5, 33.0]);
    }

    #[test]
    fn test_unknown_schema_feature() {
        let mut schema = FeatureSchema::diabetes();
        schema.features[0].name = "Insulin".to_string();
        assert!(example().to_feature_row(&schema).is_err());
    }

    #[test]
    fn test_params_keep_float_formatting() {
        let params = example().as_params();
        assert_eq!(params["Pregnancies"], "2");
        assert_eq!(params["Glucose"], "120.0");
        assert_eq!(params["BMI"], "28.5");
    }

    #[test]
    fn test_response_rounds_probability() {
        let prediction = Prediction {
            label: 1,
            probability: 0.678_951_2,
        };
        let response = PredictionResponse::new(prediction, example());
        assert_eq!(response.probability_diabetes, 0.679);
        assert_eq!(round_probability(0.123_46), 0.1235);
    }

    #[test]
    fn test_metrics_keep_raw_probability() {
        let prediction = Prediction {
            label: 0,
            probability: 0.123_456,
        };
        let metrics = prediction.as_metrics();
        assert_eq!(metrics["predicted_label"], 0.0);
        assert_eq!(metrics["predicted_probability"], 0.123_456);
    }
}
