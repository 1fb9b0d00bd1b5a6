//! Isolation forest outlier scoring.
//!
//! Random axis-aligned partitioning isolates outliers in fewer splits than
//! inliers. The average isolation depth across an ensemble of trees,
//! normalized by the expected depth of an unsuccessful BST search, gives an
//! anomaly score in (0, 1] where larger means more anomalous.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForestError {
    #[error("cannot fit a forest on {0} points (need at least 2)")]
    TooFewPoints(usize),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("point {index} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("point {0} contains a non-finite value")]
    NonFinite(usize),
}

/// Forest hyper-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Per-tree sample size; clamped to the number of points.
    pub max_samples: usize,
    /// Expected outlier fraction in (0, 0.5]. Sets the score threshold.
    pub contamination: f64,
    /// `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_samples < 2 {
            return Err(ForestError::InvalidParameter(
                "max_samples must be at least 2".to_string(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ForestError::InvalidParameter(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        Ok(())
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes.
///
/// Used both to normalize scores and to credit leaves that still hold
/// several points when the depth limit stopped the split.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile (`q` in 0..=100) of `values`.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One randomly partitioned tree, stored as a flat arena.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(points: &[Vec<f64>], indices: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(points, indices, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        points: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { size: indices.len() });

        if depth >= max_depth || indices.len() <= 1 {
            return slot;
        }

        // Only features that still vary inside this node can split it.
        let dim = points[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..dim)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(points[i][f]), hi.max(points[i][f])),
                );
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return slot;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| points[i][feature] <= threshold);

        let left = self.grow(points, left_idx, depth + 1, max_depth, rng);
        let right = self.grow(points, right_idx, depth + 1, max_depth, rng);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// A forest fitted on one batch, with the score threshold derived from
/// that same batch.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    dim: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Fit a forest on `points` and set the anomaly threshold at the
    /// `1 - contamination` quantile of their scores.
    pub fn fit(points: &[Vec<f64>], params: &ForestParams) -> Result<Self, ForestError> {
        params.validate()?;
        if points.len() < 2 {
            return Err(ForestError::TooFewPoints(points.len()));
        }
        let dim = points[0].len();
        if dim == 0 {
            return Err(ForestError::InvalidParameter(
                "points must have at least one dimension".to_string(),
            ));
        }
        for (index, p) in points.iter().enumerate() {
            if p.len() != dim {
                return Err(ForestError::DimensionMismatch {
                    index,
                    expected: dim,
                    found: p.len(),
                });
            }
            if p.iter().any(|v| !v.is_finite()) {
                return Err(ForestError::NonFinite(index));
            }
        }

        let n = points.len();
        let sample_size = params.max_samples.min(n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        // Draw per-tree seeds up front so parallel construction stays
        // reproducible under a fixed master seed.
        let tree_seeds: Vec<u64> = (0..params.n_estimators).map(|_| rng.gen()).collect();

        let trees: Vec<IsolationTree> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let indices = sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::build(points, indices, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            dim,
            threshold: f64::INFINITY,
        };
        let scores = forest.score_all(points);
        forest.threshold = percentile(&scores, 100.0 * (1.0 - params.contamination));
        Ok(forest)
    }

    /// Anomaly score of one point in (0, 1].
    ///
    /// # Panics
    /// Panics if `point` has a different dimensionality than the fitted data.
    pub fn score(&self, point: &[f64]) -> f64 {
        assert_eq!(point.len(), self.dim, "isolation forest: dimension mismatch");
        let mean_depth = self
            .trees
            .iter()
            .map(|t| t.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_depth / average_path_length(self.sample_size))
    }

    pub fn score_all(&self, points: &[Vec<f64>]) -> Vec<f64> {
        points.par_iter().map(|p| self.score(p)).collect()
    }

    /// Scores strictly above this value are anomalous.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_anomalous(&self, score: f64) -> bool {
        score > self.threshold
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}
