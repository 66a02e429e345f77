//! Per-feature standard scaler fit once during training and reused verbatim
//! at scoring time (it is part of the persisted bundle).

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v / n;
            }
        }

        let mut variance = vec![0.0; n_features];
        for row in rows {
            for (var, (v, m)) in variance.iter_mut().zip(row.iter().zip(mean.iter())) {
                *var += (v - m).powi(2) / n;
            }
        }

        let std = variance
            .into_iter()
            .map(|v| v.sqrt().max(EPSILON))
            .collect();

        Self { mean, std }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, v)| {
                let mean = self.mean.get(i).copied().unwrap_or(0.0);
                let std = self.std.get(i).copied().unwrap_or(1.0).max(EPSILON);
                (v - mean) / std
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_computes_per_column_mean_and_std() {
        let rows = vec![vec![0.0, 10.0], vec![2.0, 10.0], vec![4.0, 10.0]];
        let scaler = StandardScaler::fit(&rows);
        assert!((scaler.mean[0] - 2.0).abs() < 1e-9);
        assert!((scaler.mean[1] - 10.0).abs() < 1e-9);
        // constant column collapses std to the epsilon floor, not zero.
        assert!(scaler.std[1] >= EPSILON);
    }

    #[test]
    fn transform_centers_and_scales() {
        let rows = vec![vec![0.0], vec![10.0]];
        let scaler = StandardScaler::fit(&rows);
        let transformed = scaler.transform(&[5.0]);
        assert!((transformed[0] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn transform_never_divides_by_exact_zero() {
        let rows = vec![vec![1.0], vec![1.0], vec![1.0]];
        let scaler = StandardScaler::fit(&rows);
        let transformed = scaler.transform(&[1.0]);
        assert!(transformed[0].is_finite());
    }

    #[test]
    fn transform_fills_missing_trailing_columns_with_zero_mean_unit_std() {
        let rows = vec![vec![1.0, 2.0]];
        let scaler = StandardScaler::fit(&rows);
        let transformed = scaler.transform(&[1.0, 2.0, 3.0]);
        assert_eq!(transformed.len(), 3);
        assert!(transformed[2].is_finite());
    }
}
