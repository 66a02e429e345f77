//! Thin process entry point: two modes, `monitor` and `train`, both argument
//! driven. Neither implements authentication, an HTTP surface, or interface
//! enumeration — those are out of scope for this binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vigilnet::capture::{CaptureBackend, CaptureEngine, SyntheticBackend};
use vigilnet::detector::resolve_model_path;
use vigilnet::firewall::LoggingFirewall;
use vigilnet::monitor::{capture_and_train_until_interrupt, MonitorConfig};
use vigilnet::store::Store;
use vigilnet::{IdsConfig, Monitor};

fn main() {
    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_default();

    match mode.as_str() {
        "monitor" => {
            let iface = args.next().unwrap_or_else(|| "any".to_string());
            if let Err(e) = run_monitor(&iface) {
                eprintln!("monitor mode failed: {e}");
                std::process::exit(1);
            }
        }
        "train" => {
            let iface = args.next().unwrap_or_else(|| "any".to_string());
            let model_out = args.next().unwrap_or_else(|| "model.bin".to_string());
            let min_packets: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(100);
            if let Err(e) = run_train(&iface, &model_out, min_packets) {
                eprintln!("train mode failed: {e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("usage: vigilnetd monitor <iface> | vigilnetd train <iface> <model-out> <min-packets>");
            std::process::exit(2);
        }
    }
}

fn run_monitor(iface: &str) -> anyhow::Result<()> {
    let config = IdsConfig::load("vigilnet.toml")?;
    vigilnet::init_logging(&config.logging.log_level);

    let store = Arc::new(Store::open(&config.sqlite_db)?);
    let firewall = Arc::new(LoggingFirewall::new());

    let model_path = resolve_model_path(&config.model_path, &config.model_dir)?;
    let monitor = Arc::new(Monitor::new(
        config.default_window_size,
        Arc::clone(&store),
        firewall,
        config.signatures.enable,
        MonitorConfig {
            thresholds: config.alert_thresholds(),
            warmup: config.default_window_size.min(32).max(1),
            online_retrain_interval: config.monitoring.online_retrain_interval,
            model_path: model_path.clone(),
            firewall_enabled: true,
            detector_params: vigilnet::detector::DetectorParams {
                contamination: config.isolation_forest.contamination,
                n_estimators: config.isolation_forest.n_estimators,
                random_state: config.isolation_forest.random_state,
            },
        },
    ));

    if model_path.exists() {
        if let Err(e) = monitor.load_model(&model_path) {
            tracing::warn!("failed to load existing model at {}: {e}", model_path.display());
        }
    }
    monitor.sync_firewall_from_store()?;

    let backend: Arc<dyn CaptureBackend> = Arc::new(SyntheticBackend::repeating(
        Vec::new(),
        std::time::Duration::from_millis(100),
    ));
    let monitor_for_capture = Arc::clone(&monitor);
    let mut engine = CaptureEngine::start(backend, iface.to_string(), move |data, ts| {
        if let Err(e) = monitor_for_capture.analyze(data, ts) {
            tracing::warn!("analyze failed: {e}");
        }
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })?;

    tracing::info!("vigilnetd monitoring {iface}, packets processed so far: {}", monitor.packet_counter());
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    tracing::info!("shutting down, {} packets processed", monitor.packet_counter());
    engine.stop();
    Ok(())
}

fn run_train(iface: &str, model_out: &str, min_packets: usize) -> anyhow::Result<()> {
    let config = IdsConfig::load("vigilnet.toml")?;
    vigilnet::init_logging(&config.logging.log_level);

    let backend: Arc<dyn CaptureBackend> = Arc::new(SyntheticBackend::repeating(
        Vec::new(),
        std::time::Duration::from_millis(100),
    ));
    let params = vigilnet::detector::DetectorParams {
        contamination: config.isolation_forest.contamination,
        n_estimators: config.isolation_forest.n_estimators,
        random_state: config.isolation_forest.random_state,
    };
    let model_path = resolve_model_path(model_out, &config.model_dir)?;
    let trained = capture_and_train_until_interrupt(
        backend,
        iface,
        &model_path,
        min_packets,
        config.training.until_ctrl_c_window,
        params,
    )?;

    if trained {
        tracing::info!("training complete, model saved to {}", model_path.display());
    } else {
        tracing::warn!("too few packets captured; no model written");
    }
    Ok(())
}
