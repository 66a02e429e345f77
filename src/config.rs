//! File-backed configuration for the detection pipeline, with environment
//! overrides and startup validation.
//!
//! Config sections mirror the component design: window sizing, model
//! persistence, the isolation-forest hyperparameters, monitoring thresholds,
//! the signature engine's enable flag, training, and logging. `MODEL_DIR` and
//! `SQLITE_DB` are resolved from the environment rather than the file, since
//! they describe where the process runs rather than how it behaves.

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, Result};

fn default_window_size() -> usize {
    256
}
fn default_model_path() -> String {
    "model.bin".to_string()
}
fn default_contamination() -> f64 {
    0.05
}
fn default_n_estimators() -> usize {
    200
}
fn default_random_state() -> u64 {
    42
}
fn default_retrain_interval() -> u64 {
    0
}
fn default_thresholds() -> String {
    "-0.10, -0.05".to_string()
}
fn default_rolling_parquet_path() -> String {
    "rolling.parquet".to_string()
}
fn default_until_ctrl_c_window() -> usize {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestConfig {
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            contamination: default_contamination(),
            n_estimators: default_n_estimators(),
            random_state: default_random_state(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_retrain_interval")]
    pub online_retrain_interval: u64,
    #[serde(default = "default_thresholds")]
    pub alert_thresholds: String,
    #[serde(default)]
    pub simulate_traffic: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            online_retrain_interval: default_retrain_interval(),
            alert_thresholds: default_thresholds(),
            simulate_traffic: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignaturesConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SignaturesConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub save_rolling_parquet: bool,
    #[serde(default = "default_rolling_parquet_path")]
    pub rolling_parquet_path: String,
    #[serde(default = "default_until_ctrl_c_window")]
    pub until_ctrl_c_window: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            save_rolling_parquet: false,
            rolling_parquet_path: default_rolling_parquet_path(),
            until_ctrl_c_window: default_until_ctrl_c_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_file_logging: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_file_logging: false,
            log_level: default_log_level(),
        }
    }
}

/// Top-level configuration, loaded once at startup and passed down as an
/// explicit struct. `MODEL_DIR` and `SQLITE_DB` live on this struct too, but
/// are populated from the environment in [`IdsConfig::load`] rather than from
/// the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsConfig {
    #[serde(default = "default_window_size")]
    pub default_window_size: usize,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default)]
    pub isolation_forest: IsolationForestConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub signatures: SignaturesConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(skip)]
    pub model_dir: std::path::PathBuf,
    #[serde(skip)]
    pub sqlite_db: std::path::PathBuf,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            default_window_size: default_window_size(),
            model_path: default_model_path(),
            isolation_forest: IsolationForestConfig::default(),
            monitoring: MonitoringConfig::default(),
            signatures: SignaturesConfig::default(),
            training: TrainingConfig::default(),
            logging: LoggingConfig::default(),
            model_dir: std::path::PathBuf::from("./models"),
            sqlite_db: std::path::PathBuf::from("./ids.sqlite3"),
        }
    }
}

impl IdsConfig {
    /// Load configuration from a TOML file on disk, then layer `MODEL_DIR` and
    /// `SQLITE_DB` environment variables on top, then validate.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("IDS").separator("__"))
            .build()?;

        let mut cfg: IdsConfig = settings.try_deserialize()?;

        cfg.model_dir = std::env::var("MODEL_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("./models"));
        cfg.sqlite_db = std::env::var("SQLITE_DB")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("./ids.sqlite3"));

        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse `Monitoring.AlertThresholds` as two comma-separated floats,
    /// falling back to the defaults `(-0.10, -0.05)` on any parse failure.
    pub fn alert_thresholds(&self) -> (f64, f64) {
        parse_thresholds(&self.monitoring.alert_thresholds).unwrap_or((-0.10, -0.05))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_window_size < 1 {
            return Err(IdsError::Config("DefaultWindowSize must be >= 1".into()));
        }
        if !(0.0..=0.5).contains(&self.isolation_forest.contamination) {
            return Err(IdsError::Config(
                "IsolationForest.Contamination must be in (0, 0.5]".into(),
            ));
        }
        if self.isolation_forest.n_estimators == 0 {
            return Err(IdsError::Config(
                "IsolationForest.NEstimators must be >= 1".into(),
            ));
        }
        if parse_thresholds(&self.monitoring.alert_thresholds).is_none() {
            return Err(IdsError::Config(format!(
                "Monitoring.AlertThresholds is not two comma-separated floats: {}",
                self.monitoring.alert_thresholds
            )));
        }
        match self.logging.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(IdsError::Config(format!(
                    "Logging.LogLevel is not a recognized level: {other}"
                )))
            }
        }
        Ok(())
    }
}

fn parse_thresholds(raw: &str) -> Option<(f64, f64)> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(a)), Some(Ok(b)), None) => Some((a, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(IdsConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_window_size() {
        let mut cfg = IdsConfig::default();
        cfg.default_window_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_contamination() {
        let mut cfg = IdsConfig::default();
        cfg.isolation_forest.contamination = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unparseable_thresholds() {
        let mut cfg = IdsConfig::default();
        cfg.monitoring.alert_thresholds = "not, numbers".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = IdsConfig::default();
        cfg.logging.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_alert_thresholds() {
        let cfg = IdsConfig {
            monitoring: MonitoringConfig {
                alert_thresholds: "-0.20, -0.10".into(),
                ..MonitoringConfig::default()
            },
            ..IdsConfig::default()
        };
        assert_eq!(cfg.alert_thresholds(), (-0.20, -0.10));
    }

    #[test]
    fn falls_back_to_defaults_on_unparseable_thresholds_at_runtime() {
        assert_eq!(parse_thresholds("garbage"), None);
    }
}
