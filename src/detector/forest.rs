//! An isolation-forest-style ensemble: random-split binary trees whose
//! average path length to isolate a point is inversely related to how
//! anomalous that point is. Lower decision score = more anomalous.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const MAX_SAMPLE_SIZE: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
enum Node {
    Leaf { size: usize },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

fn build_node(rows: &[Vec<f64>], indices: &[usize], depth: usize, max_depth: usize, rng: &mut ChaCha8Rng) -> Node {
    if indices.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: indices.len() };
    }

    let n_features = rows[indices[0]].len();
    if n_features == 0 {
        return Node::Leaf { size: indices.len() };
    }

    // Try a handful of random features in case the first choice is constant
    // across this subsample (no split possible).
    for _ in 0..n_features.max(1) {
        let feature = rng.gen_range(0..n_features);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &i in indices {
            let v = rows[i][feature];
            min = min.min(v);
            max = max.max(v);
        }
        if (max - min).abs() < 1e-12 {
            continue;
        }
        let threshold = rng.gen_range(min..max);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| rows[i][feature] < threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            continue;
        }
        return Node::Split {
            feature,
            threshold,
            left: Box::new(build_node(rows, &left_idx, depth + 1, max_depth, rng)),
            right: Box::new(build_node(rows, &right_idx, depth + 1, max_depth, rng)),
        };
    }

    Node::Leaf { size: indices.len() }
}

/// Average path length of an unsuccessful binary-search-tree lookup over `n`
/// items; used to normalize leaf sizes into an equivalent path length.
fn average_path_length_correction(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * (harmonic_number(n - 1.0)) - (2.0 * (n - 1.0) / n)
}

fn harmonic_number(n: f64) -> f64 {
    const EULER_MASCHERONI: f64 = 0.5772156649015329;
    n.ln() + EULER_MASCHERONI
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length_correction(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct IsolationTree {
    root: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    /// Decision-score cutoff derived from `contamination` at fit time; scores
    /// at or below this are labeled `Anomaly`.
    pub offset: f64,
}

impl IsolationForest {
    pub fn fit(rows: &[Vec<f64>], n_estimators: usize, contamination: f64, random_state: u64) -> Self {
        let sample_size = rows.len().min(MAX_SAMPLE_SIZE).max(1);
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let mut trees = Vec::with_capacity(n_estimators);
        for i in 0..n_estimators {
            let mut tree_rng = ChaCha8Rng::seed_from_u64(random_state.wrapping_add(i as u64 + 1));
            let mut all_indices: Vec<usize> = (0..rows.len()).collect();
            all_indices.shuffle(&mut tree_rng);
            all_indices.truncate(sample_size);
            let root = build_node(rows, &all_indices, 0, max_depth, &mut tree_rng);
            trees.push(IsolationTree { root });
        }

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };

        let mut scores: Vec<f64> = rows.iter().map(|r| forest.decision_score(r)).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let cut = ((contamination * scores.len() as f64).round() as usize).min(scores.len().saturating_sub(1));
        forest.offset = scores.get(cut).copied().unwrap_or(0.0);
        forest
    }

    fn normalization_constant(&self) -> f64 {
        average_path_length_correction(self.sample_size).max(1e-9)
    }

    fn average_path_length(&self, row: &[f64]) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|t| path_length(&t.root, row, 0))
            .sum();
        total / self.trees.len().max(1) as f64
    }

    /// Decision score where lower = more anomalous, matching the component
    /// contract. Anomalous points isolate quickly (short average path
    /// length), which drives this toward -1; normal points drive it toward
    /// -0.5.
    pub fn decision_score(&self, row: &[f64]) -> f64 {
        let c = self.normalization_constant();
        let exponent = -self.average_path_length(row) / c;
        -(2f64.powf(exponent))
    }

    pub fn predict_is_anomaly(&self, row: &[f64]) -> bool {
        self.decision_score(row) <= self.offset
    }
}
