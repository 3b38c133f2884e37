//! Evaluation metrics for binary predictions.
//!
//! `mse` and `r2` treat labels as real numbers, matching how the training
//! run has always been reported.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub mse: f64,
    pub r2: f64,
    pub accuracy: f64,
}

impl EvaluationMetrics {
    pub fn compute(y_true: &[u8], y_pred: &[u8]) -> Self {
        Self {
            mse: mean_squared_error(y_true, y_pred),
            r2: r2_score(y_true, y_pred),
            accuracy: accuracy(y_true, y_pred),
        }
    }
}

fn pairs<'a>(y_true: &'a [u8], y_pred: &'a [u8]) -> impl Iterator<Item = (f64, f64)> + 'a {
    debug_assert_eq!(y_true.len(), y_pred.len());
    y_true
        .iter()
        .zip(y_pred)
        .map(|(&t, &p)| (f64::from(t), f64::from(p)))
}

/// Mean squared error; 0 for empty input.
pub fn mean_squared_error(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let sum: f64 = pairs(y_true, y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    sum / y_true.len() as f64
}

/// Coefficient of determination.
///
/// With a constant target the score is 1.0 for a perfect prediction and 0.0
/// otherwise.
pub fn r2_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().map(|&t| f64::from(t)).sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = pairs(y_true, y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|&t| (f64::from(t) - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Fraction of exact matches; 0 for empty input.
pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}
