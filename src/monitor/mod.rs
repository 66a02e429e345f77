//! Wires the pipeline, detector, signature engine, store, and firewall
//! together into the per-frame analysis loop.

mod blocked;
mod retrain;

pub use blocked::BlockedSet;
pub use retrain::{RetrainJob, RetrainWorker};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::detector::{AnomalyDetector, DetectorParams, Label};
use crate::error::Result;
use crate::firewall::FirewallAdapter;
use crate::model::PacketRecord;
use crate::pipeline::PacketProcessor;
use crate::signatures::{Severity, SignatureEngine};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    High,
    Medium,
    Low,
    Unknown,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::High => "high",
            AlertSeverity::Medium => "medium",
            AlertSeverity::Low => "low",
            AlertSeverity::Unknown => "unknown",
        }
    }

    /// `score <= thr_high -> high`; `thr_high < score <= thr_med -> medium`;
    /// `score > thr_med -> low`.
    pub fn from_score(score: Option<f64>, thr_high: f64, thr_med: f64) -> Self {
        match score {
            None => AlertSeverity::Unknown,
            Some(s) if s <= thr_high => AlertSeverity::High,
            Some(s) if s <= thr_med => AlertSeverity::Medium,
            Some(_) => AlertSeverity::Low,
        }
    }
}

pub struct MonitorConfig {
    pub thresholds: (f64, f64),
    pub warmup: usize,
    pub online_retrain_interval: u64,
    pub model_path: PathBuf,
    pub firewall_enabled: bool,
    pub detector_params: DetectorParams,
}

/// The orchestrator: holds the mutable pipeline state and the handles to
/// every collaborator `analyze` touches.
pub struct Monitor {
    processor: Mutex<PacketProcessor>,
    detector: Arc<Mutex<AnomalyDetector>>,
    signature_engine: SignatureEngine,
    store: Arc<Store>,
    firewall: Arc<dyn FirewallAdapter>,
    runtime_blocked: BlockedSet,
    packet_counter: AtomicU64,
    config: MonitorConfig,
    retrain_worker: Option<RetrainWorker>,
}

impl Monitor {
    pub fn new(
        window_size: usize,
        store: Arc<Store>,
        firewall: Arc<dyn FirewallAdapter>,
        signatures_enabled: bool,
        config: MonitorConfig,
    ) -> Self {
        let detector = Arc::new(Mutex::new(AnomalyDetector::new(config.detector_params.clone())));
        let retrain_worker = RetrainWorker::start(Arc::clone(&detector)).ok();
        Self {
            processor: Mutex::new(PacketProcessor::new(window_size)),
            detector,
            signature_engine: SignatureEngine::new(signatures_enabled),
            store,
            firewall,
            runtime_blocked: BlockedSet::new(),
            packet_counter: AtomicU64::new(0),
            config,
            retrain_worker,
        }
    }

    pub fn load_model(&self, path: &Path) -> Result<()> {
        self.detector.lock().unwrap().load(path)
    }

    pub fn packet_counter(&self) -> u64 {
        self.packet_counter.load(Ordering::Relaxed)
    }

    pub fn runtime_blocked(&self) -> &BlockedSet {
        &self.runtime_blocked
    }

    /// Applies the current firewall to every IP whose most recent stored
    /// block row is still `action=block`. Called once on monitor startup.
    pub fn sync_firewall_from_store(&self) -> Result<()> {
        for block in self.store.active_blocks()? {
            let (ok, err) = self.firewall.ensure_block(&block.ip, &block.reason);
            if ok {
                self.runtime_blocked.insert(&block.ip);
            } else {
                tracing::warn!("startup firewall sync failed for {}: {:?}", block.ip, err);
            }
        }
        Ok(())
    }

    /// The per-frame analysis loop described by the component design: parse
    /// and window the frame, score it once the window has enough history,
    /// persist alerts, maybe block, run signatures, maybe schedule a retrain.
    pub fn analyze(&self, data: &[u8], timestamp: f64) -> Result<()> {
        {
            let mut processor = self.processor.lock().unwrap();
            processor.process_frame(data, timestamp);
        }
        let count = self.packet_counter.fetch_add(1, Ordering::Relaxed) + 1;

        let window = self.processor.lock().unwrap().get_window_view();
        if window.len() < self.config.warmup {
            return Ok(());
        }

        let (features, processed, local_ips) = {
            let processor = self.processor.lock().unwrap();
            let (features, processed) = processor.engineer_features(&window);
            (features, processed, processor.local_ips().to_vec())
        };
        let (Some(latest_feature), Some(latest_record)) = (features.last(), processed.last()) else {
            return Ok(());
        };

        let detector = self.detector.lock().unwrap();
        if detector.is_ready() {
            let scores = detector.decision_scores(std::slice::from_ref(latest_feature))?;
            let labels = detector.predict(std::slice::from_ref(latest_feature))?;
            drop(detector);

            let score = scores.first().copied();
            let severity = AlertSeverity::from_score(score, self.config.thresholds.0, self.config.thresholds.1);
            let label = labels.first().copied();

            if label == Some(Label::Anomaly) && matches!(severity, AlertSeverity::Medium | AlertSeverity::High) {
                let src_ip = latest_record.src_ip_string();
                self.store.add_alert(&src_ip, "anomaly score breach", severity.as_str(), "ANOMALY")?;
                if self.config.firewall_enabled {
                    self.maybe_block(&src_ip, severity)?;
                }
            }
        } else {
            drop(detector);
        }

        for hit in self.signature_engine.evaluate(
            latest_record,
            latest_feature.unique_dports_15s,
            &processed,
            &local_ips,
        ) {
            let src_ip = latest_record.src_ip_string();
            self.store.add_alert(&src_ip, &hit.description, hit.severity.as_str(), "SIGNATURE")?;
            if self.config.firewall_enabled {
                let severity = match hit.severity {
                    Severity::High => AlertSeverity::High,
                    Severity::Medium => AlertSeverity::Medium,
                    Severity::Low => AlertSeverity::Low,
                };
                self.maybe_block(&src_ip, severity)?;
            }
        }

        if self.config.online_retrain_interval > 0 && count % self.config.online_retrain_interval == 0 {
            self.schedule_retrain(&window);
        }

        Ok(())
    }

    fn schedule_retrain(&self, window: &[PacketRecord]) {
        let Some(worker) = self.retrain_worker.as_ref() else { return };
        let (rows, _) = self.processor.lock().unwrap().engineer_features(window);
        if let Err(e) = worker.submit(RetrainJob {
            rows,
            params: self.config.detector_params.clone(),
            model_path: self.config.model_path.clone(),
        }) {
            tracing::warn!("failed to schedule retrain: {e}");
        }
    }

    /// Skip conditions, firewall call, store dedup+insert, runtime set
    /// update, in that order.
    fn maybe_block(&self, ip: &str, severity: AlertSeverity) -> Result<()> {
        let local_ips = crate::pipeline::local_host_ips();
        if ip.is_empty()
            || ip == "127.0.0.1"
            || local_ips.iter().any(|l| crate::model::ip_to_string(*l) == ip)
            || self.runtime_blocked.contains(ip)
            || self.store.is_trusted(ip)?
        {
            return Ok(());
        }

        let reason = format!("auto-{}", severity.as_str());
        let (ok, err) = self.firewall.ensure_block(ip, &reason);
        if !ok {
            tracing::warn!("firewall refused to block {ip}: {:?}", err);
            return Ok(());
        }

        self.store.delete_action_by_ip(ip, "unblock")?;
        self.store.delete_action_by_ip(ip, "block")?;
        self.store.add_block(ip, "block", &reason, None)?;
        self.runtime_blocked.insert(ip);
        Ok(())
    }
}

/// `capture_and_train_until_interrupt(iface, model_path, min_packets)`: runs
/// a capture backend until a Ctrl-C signal, then fits and atomically
/// persists a fresh detector if enough packets were seen.
pub fn capture_and_train_until_interrupt(
    backend: Arc<dyn crate::capture::CaptureBackend>,
    iface: &str,
    model_path: &Path,
    min_packets: usize,
    window_size: usize,
    params: DetectorParams,
) -> Result<bool> {
    let processor = Arc::new(Mutex::new(PacketProcessor::new(window_size)));
    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    let _ = ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    });

    let mut engine = {
        let processor = Arc::clone(&processor);
        crate::capture::CaptureEngine::start(backend, iface.to_string(), move |data, ts| {
            processor.lock().unwrap().process_frame(data, ts);
        })
        .map_err(|e| crate::error::IdsError::Io(e.to_string()))?
    };

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    engine.stop();

    let window = processor.lock().unwrap().get_window_view();
    if window.len() < min_packets {
        tracing::warn!("captured {} packets, below minimum {min_packets}; not training", window.len());
        return Ok(false);
    }

    let (features, _) = processor.lock().unwrap().engineer_features(&window);
    let mut detector = AnomalyDetector::new(params);
    detector.fit(&features)?;
    detector.save(model_path)?;
    Ok(true)
}
