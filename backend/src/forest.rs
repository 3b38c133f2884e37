//! Seeded random forest for binary classification.
//!
//! Each tree is a CART tree grown on a bootstrap sample with Gini impurity and
//! `sqrt(n_features)` candidate features per split. Leaves keep the fraction of
//! positive samples that reached them, and the forest probability is the mean of
//! those fractions. Per-tree seeds are drawn from the master seed before the
//! parallel fit, so the result does not depend on thread scheduling.

use ndarray::Array2;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 5,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn positive_fraction(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { positive } => return *positive,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [u8],
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `indices` and return its root index.
    fn build(&mut self, indices: &[usize], depth: usize) -> usize {
        let node_idx = self.nodes.len();
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
        self.nodes.push(Node::Leaf {
            positive: positives as f64 / indices.len() as f64,
        });

        let pure = positives == 0 || positives == indices.len();
        if depth >= self.max_depth || indices.len() < self.min_samples_split || pure {
            return node_idx;
        }

        let Some((feature, threshold)) = self.best_split(indices, positives) else {
            return node_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, feature]] <= threshold);
        if left_indices.is_empty() || right_indices.is_empty() {
            return node_idx;
        }

        let left = self.build(&left_indices, depth + 1);
        let right = self.build(&right_indices, depth + 1);
        self.nodes[node_idx] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_idx
    }

    fn best_split(&mut self, indices: &[usize], positives: usize) -> Option<(usize, f64)> {
        let mut candidates: Vec<usize> = (0..self.x.ncols()).collect();
        candidates.shuffle(&mut self.rng);
        candidates.truncate(self.max_features);
        candidates.sort_unstable();

        let total = indices.len() as f64;
        let total_pos = positives as f64;
        let mut best: Option<(usize, f64, f64)> = None;
        let mut column: Vec<(f64, u8)> = Vec::with_capacity(indices.len());

        for feature in candidates {
            column.clear();
            column.extend(indices.iter().map(|&i| (self.x[[i, feature]], self.y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_n = 0.0;
            let mut left_pos = 0.0;
            for k in 1..column.len() {
                let (value, label) = column[k - 1];
                left_n += 1.0;
                if label == 1 {
                    left_pos += 1.0;
                }
                let next = column[k].0;
                if value == next {
                    continue;
                }

                let right_n = total - left_n;
                let impurity =
                    left_n * gini(left_pos, left_n) + right_n * gini(total_pos - left_pos, right_n);
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, (value + next) / 2.0, impurity));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn gini(positives: f64, n: f64) -> f64 {
    let p = positives / n;
    2.0 * p * (1.0 - p)
}

/// Fitted forest. Immutable after [`RandomForest::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on a samples x features matrix and 0/1 labels.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTrainingData`] for empty or mismatched
    /// inputs, labels outside {0, 1}, or a forest with no trees.
    pub fn fit(x: &Array2<f64>, y: &[u8], params: ForestParams) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(ModelError::invalid_training_data("empty feature matrix"));
        }
        if y.len() != n_samples {
            return Err(ModelError::invalid_training_data(format!(
                "{} labels for {} samples",
                y.len(),
                n_samples
            )));
        }
        if let Some(label) = y.iter().find(|&&label| label > 1) {
            return Err(ModelError::invalid_training_data(format!(
                "label {label} is not binary"
            )));
        }
        if params.n_trees == 0 {
            return Err(ModelError::invalid_training_data("n_trees must be positive"));
        }

        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);
        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();

        let trees = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sample: Vec<usize> = (0..n_samples)
                    .map(|_| rng.gen_range(0..n_samples))
                    .collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    max_depth: params.max_depth,
                    min_samples_split: params.min_samples_split,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                };
                builder.build(&sample, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Ok(Self {
            params,
            n_features,
            trees,
        })
    }

    /// Class probabilities `[negative, positive]` for one row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<[f64; 2]> {
        if row.len() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.positive_fraction(row)).sum();
        let positive = (sum / self.trees.len() as f64).clamp(0.0, 1.0);
        Ok([1.0 - positive, positive])
    }

    /// Predicted class for one row; ties go to class 0.
    pub fn predict(&self, row: &[f64]) -> Result<u8> {
        let [negative, positive] = self.predict_proba(row)?;
        Ok(u8::from(positive > negative))
    }

    /// Predicted classes for every row of `x`.
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<u8>> {
        x.outer_iter()
            .map(|row| self.predict(&row.to_vec()))
            .collect()
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
