//! Trains, scores, and persists the unsupervised anomaly model.

mod bundle;
mod forest;
mod scaler;

pub use bundle::{feature_checksum, resolve_model_path, ModelBundle, ModelBundleMeta, BUNDLE_VERSION};
pub use forest::IsolationForest;
pub use scaler::StandardScaler;

use crate::error::{IdsError, Result};
use crate::pipeline::FeatureVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Normal,
    Anomaly,
}

#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub contamination: f64,
    pub n_estimators: usize,
    pub random_state: u64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            n_estimators: 200,
            random_state: 42,
        }
    }
}

/// Trains/loads/scores the ensemble. Holds no bundle until `fit` or `load`
/// succeeds; scoring before then is a hard `ModelNotReady` error.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    params: DetectorParams,
    bundle: Option<ModelBundle>,
}

impl AnomalyDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params, bundle: None }
    }

    pub fn is_ready(&self) -> bool {
        self.bundle.is_some()
    }

    pub fn feature_names(&self) -> Vec<String> {
        crate::pipeline::FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    /// Fits a fresh scaler and forest over `rows` and makes the detector
    /// immediately ready for scoring (callers still call `save` to persist).
    pub fn fit(&mut self, rows: &[FeatureVector]) -> Result<()> {
        if rows.is_empty() {
            return Err(IdsError::ModelNotReady("cannot fit on an empty feature table".into()));
        }
        let feature_names = self.feature_names();
        let table: Vec<Vec<f64>> = rows.iter().map(|fv| fv.to_array().to_vec()).collect();

        let scaler = StandardScaler::fit(&table);
        let scaled: Vec<Vec<f64>> = table.iter().map(|r| scaler.transform(r)).collect();
        let forest = IsolationForest::fit(
            &scaled,
            self.params.n_estimators,
            self.params.contamination,
            self.params.random_state,
        );

        self.bundle = Some(ModelBundle {
            model: forest,
            scaler,
            meta: ModelBundleMeta {
                version: BUNDLE_VERSION.to_string(),
                trained_at: chrono::Utc::now().to_rfc3339(),
                contamination: self.params.contamination,
                n_estimators: self.params.n_estimators,
                random_state: self.params.random_state,
                feature_checksum: feature_checksum(&feature_names),
            },
            feature_names,
        });
        Ok(())
    }

    fn reindexed_row(&self, bundle: &ModelBundle, row: &FeatureVector) -> Vec<f64> {
        let current = crate::pipeline::FEATURE_NAMES;
        let current_values = row.to_array();
        bundle
            .feature_names
            .iter()
            .map(|name| {
                current
                    .iter()
                    .position(|c| c == name)
                    .map(|idx| current_values[idx])
                    .unwrap_or(0.0)
            })
            .collect()
    }

    pub fn decision_scores(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        let bundle = self
            .bundle
            .as_ref()
            .ok_or_else(|| IdsError::ModelNotReady("detector has not been fit or loaded".into()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let reindexed = self.reindexed_row(bundle, row);
                let scaled = bundle.scaler.transform(&reindexed);
                bundle.model.decision_score(&scaled)
            })
            .collect())
    }

    pub fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<Label>> {
        let bundle = self
            .bundle
            .as_ref()
            .ok_or_else(|| IdsError::ModelNotReady("detector has not been fit or loaded".into()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let reindexed = self.reindexed_row(bundle, row);
                let scaled = bundle.scaler.transform(&reindexed);
                if bundle.model.predict_is_anomaly(&scaled) {
                    Label::Anomaly
                } else {
                    Label::Normal
                }
            })
            .collect())
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let bundle = self
            .bundle
            .as_ref()
            .ok_or_else(|| IdsError::ModelNotReady("nothing to save: detector has not been fit".into()))?;
        bundle.save_atomic(path)
    }

    pub fn load(&mut self, path: &std::path::Path) -> Result<()> {
        let bundle = ModelBundle::load_from_path(path)?;
        self.bundle = Some(bundle);
        Ok(())
    }

    pub fn bundle_metadata(&self) -> Option<ModelBundleMeta> {
        self.bundle.as_ref().map(|b| b.meta.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn uniform_rows(n: usize, seed: u64) -> Vec<FeatureVector> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| FeatureVector {
                protocol: rng.gen_range(0.0..20.0),
                packet_size_log: rng.gen_range(0.0..10.0),
                time_diff: rng.gen_range(0.0..5.0),
                dport: rng.gen_range(0.0..65535.0),
                is_ephemeral_sport: if rng.gen_bool(0.5) { 1.0 } else { 0.0 },
                unique_dports_15s: rng.gen_range(0.0..20.0),
                direction: if rng.gen_bool(0.5) { 1.0 } else { 0.0 },
            })
            .collect()
    }

    #[test]
    fn scoring_before_fit_or_load_is_model_not_ready() {
        let detector = AnomalyDetector::new(DetectorParams::default());
        let err = detector.decision_scores(&uniform_rows(1, 1)).unwrap_err();
        assert_eq!(err.kind(), "ModelNotReady");
    }

    #[test]
    fn train_save_reload_predict_roundtrips_scenario() {
        let rows = uniform_rows(200, 42);
        let mut detector = AnomalyDetector::new(DetectorParams {
            contamination: 0.05,
            n_estimators: 20,
            random_state: 42,
        });
        detector.fit(&rows).unwrap();

        let dir = std::env::temp_dir().join(format!("vigilnet-detector-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.bin");
        detector.save(&path).unwrap();

        let mut reloaded = AnomalyDetector::new(DetectorParams::default());
        reloaded.load(&path).unwrap();

        let predictions = reloaded.predict(&rows).unwrap();
        assert_eq!(predictions.len(), 200);
        let anomaly_count = predictions.iter().filter(|l| **l == Label::Anomaly).count();
        assert!(anomaly_count > 0 && anomaly_count < 60, "got {anomaly_count} anomalies out of 200");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn fit_rejects_empty_table() {
        let mut detector = AnomalyDetector::new(DetectorParams::default());
        assert!(detector.fit(&[]).is_err());
    }

    #[test]
    fn bundle_metadata_is_none_before_fit() {
        let detector = AnomalyDetector::new(DetectorParams::default());
        assert!(detector.bundle_metadata().is_none());
    }

    #[test]
    fn bundle_metadata_reflects_fit_params() {
        let mut detector = AnomalyDetector::new(DetectorParams {
            contamination: 0.1,
            n_estimators: 15,
            random_state: 7,
        });
        detector.fit(&uniform_rows(50, 1)).unwrap();
        let meta = detector.bundle_metadata().unwrap();
        assert_eq!(meta.contamination, 0.1);
        assert_eq!(meta.n_estimators, 15);
        assert_eq!(meta.random_state, 7);
        assert_eq!(meta.version, BUNDLE_VERSION);
    }
}
