//! On-host intrusion detection: packet pipeline, anomaly detector, signature
//! engine, and the Monitor that ties them together over a durable store.

pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod firewall;
pub mod model;
pub mod monitor;
pub mod pipeline;
pub mod signatures;
pub mod store;

pub use config::IdsConfig;
pub use error::{IdsError, Result};
pub use monitor::{Monitor, MonitorConfig};

/// Installs the process-wide panic hook and tracing subscriber. Called once
/// from each binary entry point before anything else runs.
pub fn init_logging(log_level: &str) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic in vigilnet: {info}");
        default_hook(info);
    }));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vigilnet={log_level}").into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
