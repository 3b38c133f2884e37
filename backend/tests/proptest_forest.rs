//! Property-based tests for the random forest and the model file.

use diabetes_api::artifact::ModelArtifact;
use diabetes_api::features::FeatureSchema;
use diabetes_api::forest::{ForestParams, RandomForest};
use diabetes_api::models::round_probability;
use ndarray::Array2;
use proptest::prelude::*;

/// Strategy for small labelled datasets with five features.
fn dataset() -> impl Strategy<Value = (Vec<f64>, Vec<u8>)> {
    (4..40usize).prop_flat_map(|n| {
        (
            prop::collection::vec(-100.0..300.0f64, n * 5),
            prop::collection::vec(0..=1u8, n),
        )
    })
}

fn fit(values: &[f64], labels: &[u8], seed: u64) -> RandomForest {
    let x = Array2::from_shape_vec((labels.len(), 5), values.to_vec()).unwrap();
    let params = ForestParams {
        n_trees: 5,
        max_depth: 4,
        seed,
        ..ForestParams::default()
    };
    RandomForest::fit(&x, labels, params).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: probabilities stay in [0, 1] and the label agrees with them
    #[test]
    fn probabilities_are_bounded_and_consistent(
        (values, labels) in dataset(),
        row in prop::collection::vec(-500.0..500.0f64, 5),
    ) {
        let forest = fit(&values, &labels, 42);
        let [negative, positive] = forest.predict_proba(&row).unwrap();
        prop_assert!((0.0..=1.0).contains(&positive));
        prop_assert!((negative + positive - 1.0).abs() < 1e-9);

        let label = forest.predict(&row).unwrap();
        prop_assert_eq!(label, u8::from(positive > negative));
    }

    /// Property: the same seed always grows the same forest
    #[test]
    fn fitting_is_deterministic((values, labels) in dataset(), seed in any::<u64>()) {
        prop_assert_eq!(fit(&values, &labels, seed), fit(&values, &labels, seed));
    }

    /// Property: a saved model predicts exactly like the in-memory one
    #[test]
    fn artifact_bytes_preserve_predictions(
        (values, labels) in dataset(),
        row in prop::collection::vec(-500.0..500.0f64, 5),
    ) {
        let forest = fit(&values, &labels, 7);
        let artifact = ModelArtifact::new(FeatureSchema::diabetes(), forest.clone()).unwrap();
        let restored = ModelArtifact::from_bytes(&artifact.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(
            restored.model.predict_proba(&row).unwrap(),
            forest.predict_proba(&row).unwrap()
        );
    }

    /// Property: displayed probabilities never carry more than 4 decimals
    #[test]
    fn rounding_is_idempotent(p in 0.0..=1.0f64) {
        let rounded = round_probability(p);
        prop_assert!((0.0..=1.0).contains(&rounded));
        prop_assert_eq!(round_probability(rounded), rounded);
        prop_assert!((rounded - p).abs() <= 0.00005 + 1e-12);
    }
}
